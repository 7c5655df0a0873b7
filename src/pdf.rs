// =============================================================================
// PDF EXPORT
// =============================================================================
// Printable documents built with printpdf:
//
// - report PDF: header plus one table row per count, discrepancies in red,
//   continued on new pages as needed
// - product label: name, key, location and the product QR code
//
// Rendering is CPU-bound; the async wrappers run it on the blocking pool.
// =============================================================================

use std::fmt::Display;
use std::io::Cursor;

use chrono::NaiveDate;
use printpdf::image_crate::codecs::png::PngDecoder;
use printpdf::{
    BuiltinFont, Color, Image, ImageTransform, IndirectFontRef, Line, Mm, PdfDocument,
    PdfDocumentReference, PdfLayerReference, Point, Rgb,
};

use crate::error::{AppError, AppResult};
use crate::models::{ProductDetail, ReportSummary};

const A4_WIDTH: f32 = 210.0;
const A4_HEIGHT: f32 = 297.0;
const MARGIN_X: f32 = 15.0;
const CONTENT_WIDTH: f32 = 180.0;
const TOP_Y: f32 = 277.0;
const BOTTOM_Y: f32 = 20.0;
const ROW_HEIGHT: f32 = 6.0;

/// (header, width in mm, max characters)
const COLUMNS: [(&str, f32, usize); 6] = [
    ("Product", 50.0, 28),
    ("Key", 30.0, 14),
    ("System", 18.0, 8),
    ("Physical", 18.0, 8),
    ("Status", 24.0, 12),
    ("Observations", 40.0, 24),
];

const LABEL_WIDTH: f32 = 105.0;
const LABEL_HEIGHT: f32 = 148.0;
const QR_DPI: f32 = 150.0;

fn pdf_error(err: impl Display) -> AppError {
    AppError::Internal(format!("PDF rendering failed: {err}"))
}

/// `Report_{id}_{YYYY-MM-DD}.pdf`, dated the day the file is exported
pub fn report_filename(report: &ReportSummary, exported_on: NaiveDate) -> String {
    format!("Report_{}_{}.pdf", report.id, exported_on.format("%Y-%m-%d"))
}

pub fn label_filename(product: &ProductDetail) -> String {
    format!("Label_{}.pdf", product.product.sku)
}

/// Cut `text` to `max` characters, marking the cut with ".."
fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max.saturating_sub(2)).collect();
    cut.push_str("..");
    cut
}

struct Pen<'a> {
    font: &'a IndirectFontRef,
    bold: &'a IndirectFontRef,
}

impl Pen<'_> {
    fn text(&self, layer: &PdfLayerReference, x: f32, y: f32, size: f32, text: &str) {
        layer.use_text(text, size, Mm(x), Mm(y), self.font);
    }

    fn heading(&self, layer: &PdfLayerReference, x: f32, y: f32, size: f32, text: &str) {
        layer.use_text(text, size, Mm(x), Mm(y), self.bold);
    }
}

fn rule(layer: &PdfLayerReference, y: f32) {
    layer.add_line(Line::from_iter(vec![
        (Point::new(Mm(MARGIN_X), Mm(y)), false),
        (Point::new(Mm(MARGIN_X + CONTENT_WIDTH), Mm(y)), false),
    ]));
}

fn black() -> Color {
    Color::Rgb(Rgb::new(0.0, 0.0, 0.0, None))
}

fn red() -> Color {
    Color::Rgb(Rgb::new(0.8, 0.1, 0.1, None))
}

fn new_page(doc: &PdfDocumentReference, width: f32, height: f32) -> PdfLayerReference {
    let (page, layer) = doc.add_page(Mm(width), Mm(height), "Layer 1");
    doc.get_page(page).get_layer(layer)
}

// =============================================================================
// REPORT
// =============================================================================

pub fn render_report(report: &ReportSummary) -> AppResult<Vec<u8>> {
    let title = format!("Inventory Report {}", report.id);
    let (doc, page, layer) = PdfDocument::new(&title, Mm(A4_WIDTH), Mm(A4_HEIGHT), "Layer 1");
    let font = doc.add_builtin_font(BuiltinFont::Helvetica).map_err(pdf_error)?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(pdf_error)?;
    let pen = Pen { font: &font, bold: &bold };

    let mut layer = doc.get_page(page).get_layer(layer);
    let mut y = TOP_Y;

    pen.heading(&layer, MARGIN_X, y, 18.0, &title);
    y -= 9.0;
    pen.text(
        &layer,
        MARGIN_X,
        y,
        10.0,
        &format!("Date: {}", report.date.format("%Y-%m-%d %H:%M UTC")),
    );
    y -= 5.5;
    pen.text(
        &layer,
        MARGIN_X,
        y,
        10.0,
        &format!("Employee code: {}", report.employee_code),
    );
    y -= 5.5;
    pen.text(
        &layer,
        MARGIN_X,
        y,
        10.0,
        &format!(
            "Products counted: {}    Discrepancies: {}",
            report.total_products, report.total_discrepancies
        ),
    );
    y -= 10.0;

    let header = |layer: &PdfLayerReference, y: f32| {
        let mut x = MARGIN_X;
        for (name, width, _) in COLUMNS {
            pen.heading(layer, x, y, 9.0, name);
            x += width;
        }
        rule(layer, y - 2.0);
    };

    header(&layer, y);
    y -= ROW_HEIGHT + 1.0;

    for detail in &report.verifications {
        if y < BOTTOM_Y {
            layer = new_page(&doc, A4_WIDTH, A4_HEIGHT);
            y = TOP_Y;
            header(&layer, y);
            y -= ROW_HEIGHT + 1.0;
        }

        let v = &detail.verification;
        let status = if v.matches { "OK" } else { "Discrepancy" };
        let cells = [
            detail.product_name.clone().unwrap_or_else(|| "-".to_string()),
            detail.product_sku.clone().unwrap_or_else(|| "-".to_string()),
            v.system_quantity.to_string(),
            v.physical_quantity.to_string(),
            status.to_string(),
            v.observations
                .clone()
                .filter(|o| !o.trim().is_empty())
                .unwrap_or_else(|| "-".to_string()),
        ];

        layer.set_fill_color(if v.matches { black() } else { red() });
        let mut x = MARGIN_X;
        for ((_, width, max), cell) in COLUMNS.iter().zip(cells.iter()) {
            pen.text(&layer, x, y, 8.0, &truncate(cell, *max));
            x += width;
        }
        layer.set_fill_color(black());
        y -= ROW_HEIGHT;
    }

    doc.save_to_bytes().map_err(pdf_error)
}

// =============================================================================
// PRODUCT LABEL
// =============================================================================

/// A6 label. `qr_png` is the image from the QR service; without it the label
/// carries the QR target URL as text.
pub fn render_product_label(
    product: &ProductDetail,
    target_url: &str,
    qr_png: Option<&[u8]>,
) -> AppResult<Vec<u8>> {
    let p = &product.product;
    let (doc, page, layer) =
        PdfDocument::new(&p.name, Mm(LABEL_WIDTH), Mm(LABEL_HEIGHT), "Layer 1");
    let font = doc.add_builtin_font(BuiltinFont::Helvetica).map_err(pdf_error)?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(pdf_error)?;
    let pen = Pen { font: &font, bold: &bold };
    let layer = doc.get_page(page).get_layer(layer);

    let x = 8.0;
    let mut y = LABEL_HEIGHT - 14.0;
    pen.heading(&layer, x, y, 14.0, &truncate(&p.name, 34));
    y -= 7.0;
    pen.text(&layer, x, y, 10.0, &format!("Key: {}", p.sku));
    y -= 5.5;
    if let Some(brand) = p.brand.as_deref() {
        pen.text(&layer, x, y, 10.0, &format!("Brand: {}", truncate(brand, 36)));
        y -= 5.5;
    }
    if let Some(location) = product.location_label() {
        pen.text(&layer, x, y, 10.0, &format!("Location: {}", truncate(&location, 34)));
        y -= 5.5;
    }
    pen.text(&layer, x, y, 10.0, p.fragility.label());

    match qr_png {
        Some(png) => {
            let decoder = PngDecoder::new(Cursor::new(png)).map_err(pdf_error)?;
            let image = Image::try_from(decoder).map_err(pdf_error)?;
            image.add_to_layer(
                layer.clone(),
                ImageTransform {
                    translate_x: Some(Mm(27.0)),
                    translate_y: Some(Mm(22.0)),
                    dpi: Some(QR_DPI),
                    ..Default::default()
                },
            );
        }
        None => {
            pen.text(&layer, x, 40.0, 7.0, &truncate(target_url, 70));
        }
    }

    pen.text(&layer, x, 10.0, 7.0, "CITAPP");

    doc.save_to_bytes().map_err(pdf_error)
}

// =============================================================================
// ASYNC WRAPPERS
// =============================================================================

pub async fn report_pdf(report: ReportSummary) -> AppResult<Vec<u8>> {
    tokio::task::spawn_blocking(move || render_report(&report)).await?
}

pub async fn label_pdf(
    product: ProductDetail,
    target_url: String,
    qr_png: Option<Vec<u8>>,
) -> AppResult<Vec<u8>> {
    tokio::task::spawn_blocking(move || {
        render_product_label(&product, &target_url, qr_png.as_deref())
    })
    .await?
}
