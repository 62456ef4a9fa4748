//! Form catalogue for each application kind.
//!
//! The catalogue is the single source for three things: the table columns in
//! `consulate-db`, the declarative validation rules in `consulate-api`, and
//! the labels printed on generated PDFs.

use crate::models::ApplicationKind;

/// Constraint applied to a single submitted value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRule {
    /// Free text up to `max` characters.
    Text { max: usize },
    Email,
    /// Calendar date, `YYYY-MM-DD`.
    Date,
    Phone,
    OneOf(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// camelCase key on the wire.
    pub key: &'static str,
    /// snake_case column in the kind's table.
    pub column: &'static str,
    pub label: &'static str,
    pub required: bool,
    pub rule: FieldRule,
}

const fn field(
    key: &'static str,
    column: &'static str,
    label: &'static str,
    required: bool,
    rule: FieldRule,
) -> FieldSpec {
    FieldSpec {
        key,
        column,
        label,
        required,
        rule,
    }
}

const NAME: FieldRule = FieldRule::Text { max: 120 };
const SHORT: FieldRule = FieldRule::Text { max: 60 };
const LONG: FieldRule = FieldRule::Text { max: 1000 };

pub const VISA_TYPES: &[&str] = &["shortStay", "longStay", "transit", "business", "student", "work"];
pub const GENDERS: &[&str] = &["male", "female", "other"];

const VISA_FIELDS: &[FieldSpec] = &[
    field("fullName", "full_name", "Full name", true, NAME),
    field("email", "email", "Email", true, FieldRule::Email),
    field("phone", "phone", "Phone", false, FieldRule::Phone),
    field("nationality", "nationality", "Nationality", false, SHORT),
    field("passportNumber", "passport_number", "Passport number", false, FieldRule::Text { max: 20 }),
    field("passportExpiry", "passport_expiry", "Passport expiry", false, FieldRule::Date),
    field("dateOfBirth", "date_of_birth", "Date of birth", false, FieldRule::Date),
    field("visaType", "visa_type", "Visa type", true, FieldRule::OneOf(VISA_TYPES)),
    field("purposeOfVisit", "purpose_of_visit", "Purpose of visit", false, LONG),
    field("intendedArrival", "intended_arrival", "Intended arrival", false, FieldRule::Date),
    field("durationOfStay", "duration_of_stay", "Duration of stay", false, SHORT),
    field("address", "address", "Address", false, LONG),
];

const MARRIAGE_FIELDS: &[FieldSpec] = &[
    field("fullName", "full_name", "Full name", true, NAME),
    field("email", "email", "Email", true, FieldRule::Email),
    field("phone", "phone", "Phone", false, FieldRule::Phone),
    field("spouseName", "spouse_name", "Spouse name", true, NAME),
    field("spouseNationality", "spouse_nationality", "Spouse nationality", false, SHORT),
    field("marriageDate", "marriage_date", "Date of marriage", true, FieldRule::Date),
    field("marriagePlace", "marriage_place", "Place of marriage", false, NAME),
    field("witnessOne", "witness_one", "First witness", false, NAME),
    field("witnessTwo", "witness_two", "Second witness", false, NAME),
    field("address", "address", "Address", false, LONG),
];

const BIRTH_CERTIFICATE_FIELDS: &[FieldSpec] = &[
    field("fullName", "full_name", "Applicant name", true, NAME),
    field("email", "email", "Email", true, FieldRule::Email),
    field("phone", "phone", "Phone", false, FieldRule::Phone),
    field("childName", "child_name", "Child name", true, NAME),
    field("dateOfBirth", "date_of_birth", "Date of birth", true, FieldRule::Date),
    field("placeOfBirth", "place_of_birth", "Place of birth", false, NAME),
    field("fatherName", "father_name", "Father's name", false, NAME),
    field("motherName", "mother_name", "Mother's name", false, NAME),
    field("gender", "gender", "Gender", false, FieldRule::OneOf(GENDERS)),
    field("address", "address", "Address", false, LONG),
];

const TRAVEL_PASS_FIELDS: &[FieldSpec] = &[
    field("fullName", "full_name", "Full name", true, NAME),
    field("email", "email", "Email", true, FieldRule::Email),
    field("phone", "phone", "Phone", false, FieldRule::Phone),
    field("nationality", "nationality", "Nationality", false, SHORT),
    field("dateOfBirth", "date_of_birth", "Date of birth", false, FieldRule::Date),
    field("destination", "destination", "Destination", true, NAME),
    field("travelDate", "travel_date", "Travel date", false, FieldRule::Date),
    field("reasonForTravel", "reason_for_travel", "Reason for travel", false, LONG),
    field("policeReportNumber", "police_report_number", "Police report number", false, SHORT),
    field("emergencyContact", "emergency_contact", "Emergency contact", false, NAME),
    field("address", "address", "Address", false, LONG),
];

impl ApplicationKind {
    pub fn form_fields(self) -> &'static [FieldSpec] {
        match self {
            Self::Visa => VISA_FIELDS,
            Self::Marriage => MARRIAGE_FIELDS,
            Self::BirthCertificate => BIRTH_CERTIFICATE_FIELDS,
            Self::TravelPass => TRAVEL_PASS_FIELDS,
        }
    }
}
