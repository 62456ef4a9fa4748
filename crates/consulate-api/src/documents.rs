//! Printable application summaries.
//!
//! Rendering is split in two: [`plan`] turns an application into lines of
//! text and barcode modules (pure, easy to test), and [`render_pdf`] lays the
//! plan out on as many A4 pages as it needs with printpdf.

use anyhow::{Context, Result, anyhow};
use barcoders::sym::code128::Code128;
use printpdf::{BuiltinFont, Color, Mm, PdfDocument, Rect, Rgb};

use consulate_types::models::Application;

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 20.0;
const LINE_HEIGHT: f32 = 6.5;
const WRAP_AT: usize = 80;

const BAR_MODULE_WIDTH: f32 = 0.5;
const BAR_HEIGHT: f32 = 15.0;

/// Code128 code set B selector understood by barcoders.
const CODE_SET_B: char = 'Ɓ';

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentPlan {
    pub title: String,
    pub heading: Vec<(String, String)>,
    pub fields: Vec<(String, String)>,
    /// Text encoded in the barcode and printed beneath it.
    pub barcode_payload: String,
    /// One entry per barcode module, 1 = bar.
    pub bars: Vec<u8>,
}

/// Payload of the barcode printed on every document: the application id in
/// decimal.
pub fn barcode_payload(id: i64) -> String {
    id.to_string()
}

pub fn plan(application: &Application) -> Result<DocumentPlan> {
    let payload = barcode_payload(application.id);
    let bars = Code128::new(format!("{CODE_SET_B}{payload}"))
        .map_err(|e| anyhow!("barcode encoding failed: {e:?}"))?
        .encode();

    let mut heading = vec![
        ("Reference".to_string(), format!("#{}", application.id)),
        ("Applicant account".to_string(), application.user_name.clone()),
        ("Status".to_string(), status_label(&application.status)),
        (
            "Submitted".to_string(),
            application.created_at.format("%Y-%m-%d %H:%M UTC").to_string(),
        ),
        (
            "Last updated".to_string(),
            application.updated_at.format("%Y-%m-%d %H:%M UTC").to_string(),
        ),
    ];
    if let Some(number) = &application.tracking_number {
        let carrier = application
            .shipping_carrier
            .as_deref()
            .map(|c| format!(" ({})", c.to_ascii_uppercase()))
            .unwrap_or_default();
        heading.push(("Tracking".to_string(), format!("{number}{carrier}")));
    }

    let fields = application
        .kind
        .form_fields()
        .iter()
        .filter_map(|spec| {
            let value = application.fields.get(spec.key)?.as_str()?;
            Some((spec.label.to_string(), value.to_string()))
        })
        .collect();

    Ok(DocumentPlan {
        title: application.kind.title().to_string(),
        heading,
        fields,
        barcode_payload: payload,
        bars,
    })
}

/// One line of text placed on a page, coordinates in millimetres from the
/// bottom-left corner.
#[derive(Debug, Clone, PartialEq)]
struct Placed {
    text: String,
    size: f32,
    x: f32,
    y: f32,
    bold: bool,
}

struct Pager {
    done: Vec<Vec<Placed>>,
    current: Vec<Placed>,
    y: f32,
}

impl Pager {
    fn put(&mut self, text: String, size: f32, x: f32, bold: bool) {
        self.current.push(Placed { text, size, x, y: self.y, bold });
    }

    /// Bottom limit for body text: the first page keeps room for the barcode.
    fn bottom(&self) -> f32 {
        if self.done.is_empty() {
            MARGIN + BAR_HEIGHT + LINE_HEIGHT * 2.0
        } else {
            MARGIN
        }
    }

    /// Starts a new page if the next line would not fit. Returns whether it did.
    fn ensure_room(&mut self) -> bool {
        if self.y >= self.bottom() {
            return false;
        }
        self.done.push(std::mem::take(&mut self.current));
        self.y = PAGE_HEIGHT - MARGIN;
        true
    }

    fn finish(mut self) -> Vec<Vec<Placed>> {
        self.done.push(self.current);
        self.done
    }
}

/// Positions every line of the plan, continuing onto new pages as needed.
fn layout(plan: &DocumentPlan) -> Vec<Vec<Placed>> {
    let mut pager = Pager {
        done: Vec::new(),
        current: Vec::new(),
        y: PAGE_HEIGHT - MARGIN,
    };

    pager.put(plan.title.clone(), 18.0, MARGIN, true);
    pager.y -= LINE_HEIGHT * 2.0;

    for (label, value) in &plan.heading {
        pager.put(format!("{label}:"), 11.0, MARGIN, true);
        pager.put(value.clone(), 11.0, MARGIN + 45.0, false);
        pager.y -= LINE_HEIGHT;
    }

    pager.y -= LINE_HEIGHT;
    pager.put("Application details".to_string(), 13.0, MARGIN, true);
    pager.y -= LINE_HEIGHT * 1.5;

    for (label, value) in &plan.fields {
        let mut chunks = wrap(value, WRAP_AT);
        if chunks.is_empty() {
            chunks.push(String::new());
        }
        for (i, chunk) in chunks.into_iter().enumerate() {
            let new_page = pager.ensure_room();
            if i == 0 {
                pager.put(format!("{label}:"), 10.0, MARGIN, true);
            } else if new_page {
                pager.put(format!("{label} (cont.):"), 10.0, MARGIN, true);
            }
            pager.put(chunk, 10.0, MARGIN + 45.0, false);
            pager.y -= LINE_HEIGHT;
        }
    }

    pager.finish()
}

pub fn render_pdf(application: &Application) -> Result<Vec<u8>> {
    let plan = plan(application)?;
    let pages = layout(&plan);

    let (doc, first_page, first_layer) = PdfDocument::new(
        format!("{} #{}", plan.title, application.id),
        Mm(PAGE_WIDTH),
        Mm(PAGE_HEIGHT),
        "Layer 1",
    );
    let regular = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| anyhow!("font: {e:?}"))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| anyhow!("font: {e:?}"))?;

    for (n, lines) in pages.iter().enumerate() {
        let (page, layer) = if n == 0 {
            (first_page, first_layer)
        } else {
            doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1")
        };
        let layer = doc.get_page(page).get_layer(layer);
        layer.set_fill_color(Color::Rgb(Rgb::new(0.0, 0.0, 0.0, None)));

        for line in lines {
            let font = if line.bold { &bold } else { &regular };
            layer.use_text(line.text.as_str(), line.size, Mm(line.x), Mm(line.y), font);
        }

        if n == 0 {
            // Barcode along the bottom margin, payload printed underneath.
            let bar_bottom = MARGIN + LINE_HEIGHT;
            for (x, width) in bar_runs(&plan.bars) {
                let left = MARGIN + x as f32 * BAR_MODULE_WIDTH;
                let right = left + width as f32 * BAR_MODULE_WIDTH;
                layer.add_rect(Rect::new(
                    Mm(left),
                    Mm(bar_bottom),
                    Mm(right),
                    Mm(bar_bottom + BAR_HEIGHT),
                ));
            }
            layer.use_text(plan.barcode_payload.as_str(), 10.0, Mm(MARGIN), Mm(MARGIN), &regular);
        }
    }

    doc.save_to_bytes()
        .map_err(|e| anyhow!("{e:?}"))
        .context("failed to serialize PDF")
}

/// `(start, width)` of each contiguous run of bar modules.
fn bar_runs(modules: &[u8]) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    let mut start = None;
    for (i, &m) in modules.iter().enumerate() {
        match (m == 1, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                runs.push((s, i - s));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        runs.push((s, modules.len() - s));
    }
    runs
}

fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if !current.is_empty() && current.chars().count() + 1 + word.chars().count() > width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn status_label(status: &str) -> String {
    status
        .parse::<consulate_types::models::ApplicationStatus>()
        .map(|s| s.label().to_string())
        .unwrap_or_else(|_| status.to_string())
}
