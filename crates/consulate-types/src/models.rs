use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// -- Application kinds --

/// The four consular services an applicant can file for. Each kind owns its
/// own table and form catalogue but shares one status workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApplicationKind {
    Visa,
    Marriage,
    BirthCertificate,
    TravelPass,
}

impl ApplicationKind {
    pub const ALL: [ApplicationKind; 4] = [
        ApplicationKind::Visa,
        ApplicationKind::Marriage,
        ApplicationKind::BirthCertificate,
        ApplicationKind::TravelPass,
    ];

    /// URL segment used in `/api/{slug}-applications`.
    pub fn slug(self) -> &'static str {
        match self {
            Self::Visa => "visa",
            Self::Marriage => "marriage",
            Self::BirthCertificate => "birth-certificate",
            Self::TravelPass => "travel-pass",
        }
    }

    pub fn table(self) -> &'static str {
        match self {
            Self::Visa => "visa_applications",
            Self::Marriage => "marriage_applications",
            Self::BirthCertificate => "birth_certificate_applications",
            Self::TravelPass => "travel_pass_applications",
        }
    }

    /// Human readable title, used in emails and PDF headings.
    pub fn title(self) -> &'static str {
        match self {
            Self::Visa => "Visa Application",
            Self::Marriage => "Marriage Certificate Application",
            Self::BirthCertificate => "Birth Certificate Application",
            Self::TravelPass => "Emergency Travel Pass Application",
        }
    }

    pub fn allowed_statuses(self) -> &'static [ApplicationStatus] {
        use ApplicationStatus::*;
        match self {
            Self::TravelPass => &[Pending, UnderReview, Approved, Denied, Shipped, Issued, Collected],
            _ => &[Pending, UnderReview, Approved, Denied, Shipped],
        }
    }

    pub fn allows(self, status: ApplicationStatus) -> bool {
        self.allowed_statuses().contains(&status)
    }
}

impl fmt::Display for ApplicationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for ApplicationKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.slug() == s)
            .ok_or_else(|| UnknownVariant(s.to_string()))
    }
}

// -- Status --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Pending,
    UnderReview,
    Approved,
    Denied,
    Shipped,
    Issued,
    Collected,
}

impl ApplicationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::UnderReview => "under_review",
            Self::Approved => "approved",
            Self::Denied => "denied",
            Self::Shipped => "shipped",
            Self::Issued => "issued",
            Self::Collected => "collected",
        }
    }

    /// Wording used in applicant notifications.
    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::UnderReview => "Under Review",
            Self::Approved => "Approved",
            Self::Denied => "Denied",
            Self::Shipped => "Shipped",
            Self::Issued => "Issued",
            Self::Collected => "Collected",
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApplicationStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "pending" => Self::Pending,
            "under_review" => Self::UnderReview,
            "approved" => Self::Approved,
            "denied" => Self::Denied,
            "shipped" => Self::Shipped,
            "issued" => Self::Issued,
            "collected" => Self::Collected,
            other => return Err(UnknownVariant(other.to_string())),
        })
    }
}

// -- Shipping --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Carrier {
    Dhl,
    Fedex,
    Ups,
    Usps,
    Aramex,
}

impl Carrier {
    pub const ALL: [Carrier; 5] = [
        Carrier::Dhl,
        Carrier::Fedex,
        Carrier::Ups,
        Carrier::Usps,
        Carrier::Aramex,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dhl => "dhl",
            Self::Fedex => "fedex",
            Self::Ups => "ups",
            Self::Usps => "usps",
            Self::Aramex => "aramex",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Dhl => "DHL",
            Self::Fedex => "FedEx",
            Self::Ups => "UPS",
            Self::Usps => "USPS",
            Self::Aramex => "Aramex",
        }
    }

    /// Public tracking page for a shipment.
    pub fn tracking_url(self, tracking_number: &str) -> String {
        match self {
            Self::Dhl => format!(
                "https://www.dhl.com/en/express/tracking.html?AWB={tracking_number}"
            ),
            Self::Fedex => format!("https://www.fedex.com/fedextrack/?trknbr={tracking_number}"),
            Self::Ups => format!("https://www.ups.com/track?tracknum={tracking_number}"),
            Self::Usps => format!(
                "https://tools.usps.com/go/TrackConfirmAction?tLabels={tracking_number}"
            ),
            Self::Aramex => format!("https://www.aramex.com/track/results?ShipmentNumber={tracking_number}"),
        }
    }
}

impl FromStr for Carrier {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == lowered)
            .ok_or_else(|| UnknownVariant(s.to_string()))
    }
}

// -- Chat --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatStatus {
    Active,
    Closed,
}

impl ChatStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Closed => "closed",
        }
    }
}

impl FromStr for ChatStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "closed" => Ok(Self::Closed),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderType {
    User,
    Bot,
    Admin,
}

impl SenderType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Bot => "bot",
            Self::Admin => "admin",
        }
    }
}

impl FromStr for SenderType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "bot" => Ok(Self::Bot),
            "admin" => Ok(Self::Admin),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant(pub String);

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown value '{}'", self.0)
    }
}

impl std::error::Error for UnknownVariant {}

// -- Entities as they appear on the wire --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub username: String,
    pub full_name: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

/// One transition of an application's status. Only ever produced by the
/// status workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusHistoryEntry {
    pub status: String,
    pub changed_by: String,
    pub changed_at: DateTime<Utc>,
    pub previous_status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub id: i64,
    pub kind: ApplicationKind,
    pub user_name: String,
    pub status: String,
    pub tracking_number: Option<String>,
    pub shipping_carrier: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status_history: Vec<StatusHistoryEntry>,
    /// Kind-specific form fields, keyed by their camelCase name.
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatConversation {
    pub id: i64,
    pub session_id: String,
    pub visitor_name: Option<String>,
    pub visitor_email: Option<String>,
    pub status: ChatStatus,
    pub created_at: DateTime<Utc>,
    pub last_message_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: i64,
    pub conversation_id: i64,
    pub sender_type: SenderType,
    pub sender_name: Option<String>,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitorLog {
    pub id: i64,
    pub session_id: Option<String>,
    pub page_path: String,
    pub referrer: Option<String>,
    pub user_agent: Option<String>,
    pub user_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn travel_pass_allows_extra_statuses() {
        assert!(ApplicationKind::TravelPass.allows(ApplicationStatus::Issued));
        assert!(ApplicationKind::TravelPass.allows(ApplicationStatus::Collected));
        assert!(!ApplicationKind::Visa.allows(ApplicationStatus::Issued));
        assert!(!ApplicationKind::Marriage.allows(ApplicationStatus::Collected));
        assert!(ApplicationKind::BirthCertificate.allows(ApplicationStatus::Shipped));
    }

    #[test]
    fn status_text_matches_serde() {
        for status in ApplicationKind::TravelPass.allowed_statuses() {
            let json = serde_json::to_string(status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
            assert_eq!(status.as_str().parse::<ApplicationStatus>().unwrap(), *status);
        }
        assert!("archived".parse::<ApplicationStatus>().is_err());
    }

    #[test]
    fn kind_slug_round_trips() {
        for kind in ApplicationKind::ALL {
            assert_eq!(kind.slug().parse::<ApplicationKind>().unwrap(), kind);
        }
        assert_eq!(
            serde_json::to_string(&ApplicationKind::BirthCertificate).unwrap(),
            "\"birth-certificate\""
        );
    }

    #[test]
    fn carrier_parse_is_case_insensitive() {
        assert_eq!("DHL".parse::<Carrier>().unwrap(), Carrier::Dhl);
        assert_eq!(" fedex ".parse::<Carrier>().unwrap(), Carrier::Fedex);
        assert!("pigeon".parse::<Carrier>().is_err());
        assert!(Carrier::Ups.tracking_url("1Z999").ends_with("1Z999"));
    }
}
