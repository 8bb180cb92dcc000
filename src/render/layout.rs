//! Page composition for service-order documents.
//!
//! Everything here works in PDF points on a US Letter page with the origin at
//! the top-left corner and `y` growing downwards; the encoder flips the axis.

use chrono::{NaiveDate, NaiveDateTime};

use crate::models::Order;

use super::Letterhead;

pub const PAGE_WIDTH: f32 = 612.0;
pub const PAGE_HEIGHT: f32 = 792.0;
pub const MARGIN: f32 = 40.0;

pub const DISCOUNT_RATE: f64 = 0.10;

pub const PHOTO_COLUMNS: usize = 2;
pub const PHOTO_ROWS: usize = 2;
pub const PHOTOS_PER_PAGE: usize = PHOTO_COLUMNS * PHOTO_ROWS;

const CONTENT_WIDTH: f32 = PAGE_WIDTH - 2.0 * MARGIN;
const COLUMN_GAP: f32 = 20.0;
const COLUMN_WIDTH: f32 = (CONTENT_WIDTH - COLUMN_GAP) / 2.0;
const BODY_SIZE: f32 = 9.0;
const ROW_HEIGHT: f32 = 13.0;
const LABEL_WIDTH: f32 = 96.0;
const SECTION_HEADER_HEIGHT: f32 = 16.0;
/// Wrapped lines per value. Both budgets keep page 1 above the signature band
/// even when every field is at its limit.
const COLUMN_FIELD_LINES: usize = 2;
const WIDE_FIELD_LINES: usize = 3;

const SIGNATURE_LINE_Y: f32 = 712.0;
const SIGNATURE_IMAGE_HEIGHT: f32 = 70.0;
const SIGNATURE_SLOT_WIDTH: f32 = 220.0;

const GRID_TOP: f32 = 86.0;
const GRID_BOTTOM: f32 = PAGE_HEIGHT - 56.0;
const GRID_GAP: f32 = 16.0;
const CAPTION_HEIGHT: f32 = 14.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Font {
    Regular,
    Bold,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    Text {
        x: f32,
        y: f32,
        size: f32,
        font: Font,
        text: String,
    },
    Line {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        width: f32,
    },
    /// `fill` is a gray level in `0.0..=1.0`.
    Rect {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        fill: Option<f32>,
        stroke: bool,
    },
    Image {
        image: usize,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub ops: Vec<DrawOp>,
}

impl Page {
    fn text(&mut self, x: f32, y: f32, size: f32, font: Font, text: impl Into<String>) {
        self.ops.push(DrawOp::Text {
            x,
            y,
            size,
            font,
            text: text.into(),
        });
    }

    fn line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, width: f32) {
        self.ops.push(DrawOp::Line {
            x1,
            y1,
            x2,
            y2,
            width,
        });
    }

    fn rect(&mut self, x: f32, y: f32, width: f32, height: f32, fill: Option<f32>, stroke: bool) {
        self.ops.push(DrawOp::Rect {
            x,
            y,
            width,
            height,
            fill,
            stroke,
        });
    }

    fn image(&mut self, image: ImageRef, frame: Frame) {
        let fitted = fit_within(image.width, image.height, frame);
        self.ops.push(DrawOp::Image {
            image: image.index,
            x: fitted.x,
            y: fitted.y,
            width: fitted.width,
            height: fitted.height,
        });
    }
}

/// A decoded image known to the encoder by `index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageRef {
    pub index: usize,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

pub struct LayoutInput<'a> {
    pub order: &'a Order,
    pub letterhead: &'a Letterhead,
    pub logo: Option<ImageRef>,
    pub customer_signature: Option<ImageRef>,
    pub technician_signature: Option<ImageRef>,
    /// One entry per attachment; `None` marks a photo that could not be decoded.
    pub photos: Vec<Option<ImageRef>>,
}

pub fn build_pages(input: &LayoutInput<'_>) -> Vec<Page> {
    let mut pages = vec![order_page(input)];
    let photo_pages = input.photos.len().div_ceil(PHOTOS_PER_PAGE);
    for (page_index, chunk) in input.photos.chunks(PHOTOS_PER_PAGE).enumerate() {
        pages.push(photo_page(
            &input.order.folio,
            page_index * PHOTOS_PER_PAGE,
            chunk,
            page_index + 1,
            photo_pages,
        ));
    }

    let total = pages.len();
    for (index, page) in pages.iter_mut().enumerate() {
        page.text(
            PAGE_WIDTH - MARGIN - 70.0,
            PAGE_HEIGHT - 24.0,
            8.0,
            Font::Regular,
            format!("Página {} de {}", index + 1, total),
        );
    }
    pages
}

/// Largest frame with the image's aspect ratio that fits `frame`, centered
/// inside it.
pub fn fit_within(image_width: u32, image_height: u32, frame: Frame) -> Frame {
    if image_width == 0 || image_height == 0 {
        return Frame {
            x: frame.x + frame.width / 2.0,
            y: frame.y + frame.height / 2.0,
            width: 0.0,
            height: 0.0,
        };
    }
    let scale = (frame.width / image_width as f32).min(frame.height / image_height as f32);
    let width = image_width as f32 * scale;
    let height = image_height as f32 * scale;
    Frame {
        x: frame.x + (frame.width - width) / 2.0,
        y: frame.y + (frame.height - height) / 2.0,
        width,
        height,
    }
}

fn order_page(input: &LayoutInput<'_>) -> Page {
    let order = input.order;
    let customer = order.customer();
    let vehicle = order.vehicle();
    let mut page = Page::default();

    letterhead_block(&mut page, input.letterhead, input.logo);

    let title_x = PAGE_WIDTH - MARGIN - 180.0;
    page.text(title_x, 46.0, 14.0, Font::Bold, "ORDEN DE SERVICIO");
    page.text(title_x, 64.0, 12.0, Font::Bold, format!("Folio: {}", order.folio));
    if let Some(date) = order.service_date {
        page.text(title_x, 80.0, BODY_SIZE, Font::Regular, format!("Fecha: {}", format_date(date)));
    }
    page.line(MARGIN, 96.0, PAGE_WIDTH - MARGIN, 96.0, 1.0);

    let left = MARGIN;
    let right = MARGIN + COLUMN_WIDTH + COLUMN_GAP;
    let mut y = 108.0;

    let service_rows = vec![
        ("Taller", text_value(&order.workshop)),
        ("Técnico", text_value(&order.technician)),
        ("Tipo de trabajo", text_value(&order.work_type)),
        ("Hora de asignación", timestamp_value(order.assigned_at)),
        ("Hora de contacto", timestamp_value(order.contacted_at)),
        ("Hora de término", timestamp_value(order.completed_at)),
        ("Fecha de término", date_value(order.completion_date)),
    ];
    let customer_rows = vec![
        ("Nombre", text_value(&customer.name)),
        ("Teléfono", text_value(&customer.phone)),
        ("Dirección", customer.address_line()),
        ("Correo", text_value(&customer.email)),
        ("Identificación", text_value(&customer.id_type)),
    ];
    let bottom_left = section(&mut page, left, y, COLUMN_WIDTH, "DATOS DEL SERVICIO", &service_rows, COLUMN_FIELD_LINES);
    let bottom_right = section(&mut page, right, y, COLUMN_WIDTH, "DATOS DEL CLIENTE", &customer_rows, COLUMN_FIELD_LINES);
    y = bottom_left.max(bottom_right) + 10.0;

    let vehicle_rows = vec![
        ("Placas", text_value(&vehicle.plates)),
        ("No. de serie", text_value(&vehicle.serial_number)),
        ("Marca", text_value(&vehicle.make)),
        ("Tipo", text_value(&vehicle.kind)),
        ("Año", text_value(&vehicle.year)),
    ];
    let bottom_left = section(&mut page, left, y, COLUMN_WIDTH, "DATOS DEL VEHÍCULO", &vehicle_rows, COLUMN_FIELD_LINES);
    let bottom_right = cost_section(&mut page, right, y, order);
    y = bottom_left.max(bottom_right) + 10.0;

    let description_rows = vec![
        ("Servicio", text_value(&order.service_description)),
        ("Material", text_value(&order.material)),
        ("Observaciones", text_value(&order.observations)),
    ];
    y = section(
        &mut page,
        left,
        y,
        CONTENT_WIDTH,
        "DESCRIPCIÓN DEL SERVICIO",
        &description_rows,
        WIDE_FIELD_LINES,
    ) + 12.0;

    let rating = order
        .quality_rating
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or("________________");
    page.text(left, y, 10.0, Font::Bold, "Calidad del servicio:");
    page.text(left + 112.0, y, 10.0, Font::Regular, rating);

    signature_slot(&mut page, MARGIN + 20.0, input.customer_signature, "Firma del cliente");
    signature_slot(
        &mut page,
        PAGE_WIDTH - MARGIN - 20.0 - SIGNATURE_SLOT_WIDTH,
        input.technician_signature,
        "Firma del técnico",
    );

    page
}

fn letterhead_block(page: &mut Page, letterhead: &Letterhead, logo: Option<ImageRef>) {
    let mut text_x = MARGIN;
    if let Some(logo) = logo {
        page.image(
            logo,
            Frame {
                x: MARGIN,
                y: 24.0,
                width: 110.0,
                height: 60.0,
            },
        );
        text_x += 122.0;
    }
    page.text(text_x, 44.0, 16.0, Font::Bold, letterhead.business_name.clone());
    let mut y = 58.0;
    for line in &letterhead.address_lines {
        page.text(text_x, y, 8.0, Font::Regular, line.clone());
        y += 11.0;
    }
}

/// Draws a titled block of label/value rows and returns the `y` below it.
fn section(
    page: &mut Page,
    x: f32,
    top: f32,
    width: f32,
    title: &str,
    rows: &[(&str, String)],
    lines_per_field: usize,
) -> f32 {
    page.rect(x, top, width, SECTION_HEADER_HEIGHT, Some(0.88), false);
    page.text(x + 6.0, top + 11.5, 9.5, Font::Bold, title);

    let mut y = top + SECTION_HEADER_HEIGHT + ROW_HEIGHT;
    let max_chars = chars_for_width(width - LABEL_WIDTH - 6.0, BODY_SIZE);
    for (label, value) in rows {
        page.text(x + 6.0, y, BODY_SIZE, Font::Bold, format!("{label}:"));
        for line in wrap_text(value, max_chars, lines_per_field) {
            page.text(x + LABEL_WIDTH, y, BODY_SIZE, Font::Regular, line);
            y += ROW_HEIGHT;
        }
    }
    page.rect(x, top, width, y - top - ROW_HEIGHT + 6.0, None, true);
    y - ROW_HEIGHT + 6.0
}

fn cost_section(page: &mut Page, x: f32, top: f32, order: &Order) -> f32 {
    let payment_status = if order.paid { "Pagado" } else { "Pendiente" };
    let rows = vec![
        ("Forma de pago", text_value(&order.payment_method)),
        ("Costo de material", format_currency(order.material_cost)),
        ("Mano de obra", format_currency(order.labor_cost)),
        ("Total", format_currency(order.total)),
        ("Estado de pago", payment_status.to_string()),
    ];
    let mut bottom = section(page, x, top, COLUMN_WIDTH, "COSTOS", &rows, COLUMN_FIELD_LINES);

    if order.discount {
        bottom += 6.0;
        page.rect(x, bottom, COLUMN_WIDTH, 20.0, Some(0.93), true);
        page.text(x + 6.0, bottom + 13.5, 10.0, Font::Bold, "Total con descuento (10%):");
        page.text(
            x + 150.0,
            bottom + 13.5,
            10.0,
            Font::Bold,
            format_currency(discounted_total(order.total)),
        );
        bottom += 20.0;
    }
    bottom
}

/// Customer left, technician right. An absent signature leaves its slot
/// completely empty.
fn signature_slot(page: &mut Page, x: f32, signature: Option<ImageRef>, label: &str) {
    let Some(signature) = signature else {
        return;
    };
    page.image(
        signature,
        Frame {
            x,
            y: SIGNATURE_LINE_Y - SIGNATURE_IMAGE_HEIGHT - 4.0,
            width: SIGNATURE_SLOT_WIDTH,
            height: SIGNATURE_IMAGE_HEIGHT,
        },
    );
    page.line(x, SIGNATURE_LINE_Y, x + SIGNATURE_SLOT_WIDTH, SIGNATURE_LINE_Y, 0.8);
    page.text(x + 62.0, SIGNATURE_LINE_Y + 13.0, BODY_SIZE, Font::Regular, label);
}

fn photo_page(
    folio: &str,
    first_index: usize,
    photos: &[Option<ImageRef>],
    page_number: usize,
    photo_pages: usize,
) -> Page {
    let mut page = Page::default();
    page.text(
        MARGIN,
        46.0,
        14.0,
        Font::Bold,
        format!("Evidencia fotográfica ({page_number}/{photo_pages})"),
    );
    page.text(MARGIN, 64.0, 10.0, Font::Regular, format!("Folio: {folio}"));
    page.line(MARGIN, 74.0, PAGE_WIDTH - MARGIN, 74.0, 1.0);

    let cell_width = (CONTENT_WIDTH - GRID_GAP * (PHOTO_COLUMNS as f32 - 1.0)) / PHOTO_COLUMNS as f32;
    let cell_height =
        (GRID_BOTTOM - GRID_TOP - GRID_GAP * (PHOTO_ROWS as f32 - 1.0)) / PHOTO_ROWS as f32;

    for (slot, photo) in photos.iter().enumerate() {
        let column = slot % PHOTO_COLUMNS;
        let row = slot / PHOTO_COLUMNS;
        let cell = Frame {
            x: MARGIN + column as f32 * (cell_width + GRID_GAP),
            y: GRID_TOP + row as f32 * (cell_height + GRID_GAP),
            width: cell_width,
            height: cell_height - CAPTION_HEIGHT,
        };

        match photo {
            Some(image) => page.image(*image, cell),
            None => {
                page.rect(cell.x, cell.y, cell.width, cell.height, None, true);
                page.text(
                    cell.x + cell.width / 2.0 - 45.0,
                    cell.y + cell.height / 2.0,
                    BODY_SIZE,
                    Font::Regular,
                    "Imagen no disponible",
                );
            }
        }
        page.text(
            cell.x,
            cell.y + cell.height + 11.0,
            8.0,
            Font::Regular,
            format!("Foto {}", first_index + slot + 1),
        );
    }
    page
}

pub fn discounted_total(total: f64) -> f64 {
    total * (1.0 - DISCOUNT_RATE)
}

/// `$1,234.50` style amounts.
pub fn format_currency(amount: f64) -> String {
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (index, digit) in whole.chars().enumerate() {
        if index > 0 && (whole.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    let sign = if amount < 0.0 && cents > 0 { "-" } else { "" };
    format!("{sign}${grouped}.{:02}", cents % 100)
}

/// Greedy word wrap. Words longer than a line are split; output beyond
/// `max_lines` is cut and marked with an ellipsis.
pub fn wrap_text(text: &str, max_chars: usize, max_lines: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut lines: Vec<String> = Vec::new();
    for paragraph in text.lines() {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > max_chars {
                if !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                }
                let rest = word.split_off(max_chars);
                lines.push(word.into_iter().collect());
                word = rest;
            }
            let word: String = word.into_iter().collect();
            let needed = if current.is_empty() {
                word.chars().count()
            } else {
                current.chars().count() + 1 + word.chars().count()
            };
            if needed > max_chars && !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(&word);
        }
        if !current.is_empty() {
            lines.push(current);
        }
    }

    if lines.is_empty() {
        lines.push(String::new());
    }
    if lines.len() > max_lines {
        lines.truncate(max_lines);
        if let Some(last) = lines.last_mut() {
            last.push('…');
        }
    }
    lines
}

/// Helvetica averages roughly half an em per character.
fn chars_for_width(width: f32, size: f32) -> usize {
    (width / (size * 0.5)).floor().max(1.0) as usize
}

fn text_value(value: &Option<String>) -> String {
    value
        .as_deref()
        .map(str::trim)
        .unwrap_or_default()
        .to_string()
}

fn timestamp_value(value: Option<NaiveDateTime>) -> String {
    value
        .map(|ts| ts.format("%d/%m/%Y %H:%M").to_string())
        .unwrap_or_default()
}

fn date_value(value: Option<NaiveDate>) -> String {
    value.map(format_date).unwrap_or_default()
}

fn format_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn currency_groups_thousands() {
        assert_eq!(format_currency(0.0), "$0.00");
        assert_eq!(format_currency(900.0), "$900.00");
        assert_eq!(format_currency(1000.0), "$1,000.00");
        assert_eq!(format_currency(1234567.891), "$1,234,567.89");
        assert_eq!(format_currency(-15.5), "-$15.50");
    }

    #[test]
    fn discount_is_ten_percent() {
        assert!((discounted_total(1000.0) - 900.0).abs() < f64::EPSILON * 1000.0);
    }

    fn assert_close(actual: f32, expected: f32) {
        assert!((actual - expected).abs() < 1e-3, "{actual} != {expected}");
    }

    #[test]
    fn fit_preserves_aspect_ratio_and_centers() {
        let cell = Frame {
            x: 10.0,
            y: 20.0,
            width: 200.0,
            height: 100.0,
        };
        let fitted = fit_within(400, 400, cell);
        assert_close(fitted.width, 100.0);
        assert_close(fitted.height, 100.0);
        assert_close(fitted.x, 60.0);
        assert_close(fitted.y, 20.0);

        let wide = fit_within(1000, 100, cell);
        assert_close(wide.width, 200.0);
        assert_close(wide.height, 20.0);
        assert_close(wide.y, 60.0);
    }

    #[test]
    fn wrap_breaks_on_words_and_long_tokens() {
        let lines = wrap_text("cambio de aceite y filtro", 10, 10);
        assert_eq!(lines, vec!["cambio de", "aceite y", "filtro"]);

        let lines = wrap_text("ABCDEFGHIJKLMNO", 6, 10);
        assert_eq!(lines, vec!["ABCDEF", "GHIJKL", "MNO"]);
    }

    #[test]
    fn wrap_truncates_with_ellipsis() {
        let lines = wrap_text("a b c d e f", 1, 3);
        assert_eq!(lines, vec!["a", "b", "c…"]);
    }

    #[test]
    fn long_fields_stay_above_the_signatures() {
        let long = "palabra ".repeat(200);
        let mut order = super::super::tests::sample_order();
        order.discount = true;
        order.workshop = Some(long.clone());
        order.technician = Some(long.clone());
        order.work_type = Some(long.clone());
        order.payment_method = Some(long.clone());
        order.service_description = Some(long.clone());
        order.material = Some(long.clone());
        order.observations = Some(long.clone());
        order.quality_rating = Some("Excelente".into());
        order.customer = serde_json::json!({
            "nombre": long,
            "telefono": long,
            "calle": long,
            "correo": long,
            "tipoIdentificacion": long
        });
        order.vehicle = serde_json::json!({
            "placas": long,
            "noSerie": long,
            "marca": long,
            "tipoAuto": long,
            "anio": long
        });
        let letterhead = Letterhead {
            business_name: "ServiRapid".into(),
            address_lines: vec!["Av. Siempre Viva 742".into()],
            logo: None,
        };
        let input = LayoutInput {
            order: &order,
            letterhead: &letterhead,
            logo: None,
            customer_signature: None,
            technician_signature: None,
            photos: Vec::new(),
        };

        let pages = build_pages(&input);
        let signature_top = SIGNATURE_LINE_Y - SIGNATURE_IMAGE_HEIGHT - 4.0;
        let body_bottom = pages[0]
            .ops
            .iter()
            .filter_map(|op| match op {
                DrawOp::Text { y, text, .. }
                    if !text.starts_with("Página") && !text.starts_with("Firma del") =>
                {
                    Some(*y)
                }
                DrawOp::Rect { y, height, .. } => Some(y + height),
                _ => None,
            })
            .fold(0.0_f32, f32::max);
        assert!(body_bottom < signature_top, "{body_bottom} >= {signature_top}");
    }

    #[test]
    fn wrap_of_empty_text_is_one_blank_line() {
        assert_eq!(wrap_text("", 20, 3), vec![String::new()]);
    }
}
