//! Order documents.
//!
//! [`render_order`] is pure: it reads nothing but its arguments, so the same
//! order, attachments and letterhead always produce the same bytes. Layout and
//! PDF encoding are separate stages (see [`layout`] and [`pdf`]).

pub mod images;
pub mod layout;
pub mod pdf;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use thiserror::Error;

use crate::config::AppConfig;
use crate::models::Order;

use images::{decode_data_url, decode_raster, ImageDecodeError, RasterImage};
use layout::{ImageRef, LayoutInput};

/// Business identity printed at the top of every order.
#[derive(Debug, Clone, Default)]
pub struct Letterhead {
    pub business_name: String,
    pub address_lines: Vec<String>,
    pub logo: Option<Vec<u8>>,
}

impl Letterhead {
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let logo = match &config.logo_path {
            Some(path) => Some(
                std::fs::read(path).with_context(|| format!("failed to read logo at {path}"))?,
            ),
            None => None,
        };
        Ok(Self {
            business_name: config.business_name.clone(),
            address_lines: config.business_address.clone(),
            logo,
        })
    }
}

/// A photo uploaded with a submission. Photos are rendered but never stored
/// on the order.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: String,
    pub bytes: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSlot {
    Logo,
    CustomerSignature,
    TechnicianSignature,
    Photo(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedImage {
    pub slot: ImageSlot,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct RenderedDocument {
    pub bytes: Vec<u8>,
    pub page_count: usize,
    /// Images that could not be decoded. Their slots are drawn empty (logo,
    /// signatures) or with a placeholder (photos).
    pub skipped_images: Vec<SkippedImage>,
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to encode PDF: {0}")]
    Encode(#[from] lopdf::Error),
    #[error("rendering did not finish within {0:?}")]
    Timeout(Duration),
    #[error("rendering task aborted: {0}")]
    Aborted(String),
}

pub fn render_order(
    order: &Order,
    attachments: &[Attachment],
    letterhead: &Letterhead,
) -> Result<RenderedDocument, RenderError> {
    let mut embedded = ImageTable::default();

    let logo = letterhead
        .logo
        .as_deref()
        .and_then(|bytes| embedded.add(ImageSlot::Logo, decode_raster(bytes)));
    let customer_signature = signature(
        &mut embedded,
        ImageSlot::CustomerSignature,
        order.customer_signature.as_deref(),
    );
    let technician_signature = signature(
        &mut embedded,
        ImageSlot::TechnicianSignature,
        order.technician_signature.as_deref(),
    );
    let photos = attachments
        .iter()
        .enumerate()
        .map(|(index, attachment)| {
            embedded.add(ImageSlot::Photo(index), decode_raster(&attachment.bytes))
        })
        .collect();

    let pages = layout::build_pages(&LayoutInput {
        order,
        letterhead,
        logo,
        customer_signature,
        technician_signature,
        photos,
    });
    let bytes = pdf::encode(&pages, &embedded.rasters)?;

    Ok(RenderedDocument {
        bytes,
        page_count: pages.len(),
        skipped_images: embedded.skipped,
    })
}

/// Runs [`render_order`] on the blocking pool, giving up after `timeout`.
/// A timed-out render keeps running in the background until it finishes;
/// its result is discarded.
pub async fn render_with_timeout(
    order: Order,
    attachments: Vec<Attachment>,
    letterhead: Arc<Letterhead>,
    timeout: Duration,
) -> Result<RenderedDocument, RenderError> {
    let task =
        tokio::task::spawn_blocking(move || render_order(&order, &attachments, &letterhead));
    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => Err(RenderError::Aborted(join_error.to_string())),
        Err(_) => Err(RenderError::Timeout(timeout)),
    }
}

fn signature(table: &mut ImageTable, slot: ImageSlot, value: Option<&str>) -> Option<ImageRef> {
    let value = value.map(str::trim).filter(|value| !value.is_empty())?;
    let decoded = decode_data_url(value).and_then(|bytes| decode_raster(&bytes));
    table.add(slot, decoded)
}

#[derive(Default)]
struct ImageTable {
    rasters: Vec<RasterImage>,
    skipped: Vec<SkippedImage>,
}

impl ImageTable {
    fn add(
        &mut self,
        slot: ImageSlot,
        decoded: Result<RasterImage, ImageDecodeError>,
    ) -> Option<ImageRef> {
        match decoded {
            Ok(raster) => {
                let image = ImageRef {
                    index: self.rasters.len(),
                    width: raster.width,
                    height: raster.height,
                };
                self.rasters.push(raster);
                Some(image)
            }
            Err(err) => {
                self.skipped.push(SkippedImage {
                    slot,
                    reason: err.to_string(),
                });
                None
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::NaiveDate;
    use lopdf::Document;
    use serde_json::json;
    use uuid::Uuid;

    use super::images::tests::{png_bytes, png_data_url};
    use super::layout::{DrawOp, PHOTOS_PER_PAGE};
    use super::*;

    pub(crate) fn sample_order() -> Order {
        let created = NaiveDate::from_ymd_opt(2024, 5, 2)
            .and_then(|date| date.and_hms_opt(10, 30, 0))
            .unwrap();
        Order {
            id: Uuid::nil(),
            folio: "OR-0001".into(),
            service_date: NaiveDate::from_ymd_opt(2024, 5, 2),
            workshop: Some("Taller Norte".into()),
            technician: Some("Pedro Ramírez".into()),
            customer: json!({
                "nombre": "Ana López",
                "telefono": "5551234567",
                "calle": "Av. Juárez",
                "noExterior": "120",
                "colonia": "Centro",
                "correo": "ana@example.com"
            }),
            vehicle: json!({
                "placas": "ABC-123",
                "marca": "Nissan",
                "tipoAuto": "Sedán",
                "anio": "2019"
            }),
            work_type: Some("Correctivo".into()),
            service_description: Some("Cambio de balatas delanteras y rectificado de discos".into()),
            material: Some("Balatas cerámicas".into()),
            payment_method: Some("Efectivo".into()),
            material_cost: 600.0,
            labor_cost: 400.0,
            total: 1000.0,
            discount: false,
            observations: None,
            quality_rating: Some("Excelente".into()),
            customer_signature: None,
            technician_signature: None,
            assigned_at: None,
            contacted_at: None,
            completed_at: None,
            completion_date: None,
            paid: false,
            paid_at: None,
            created_at: created,
            updated_at: created,
        }
    }

    fn letterhead() -> Letterhead {
        Letterhead {
            business_name: "ServiRapid".into(),
            address_lines: vec!["Av. Siempre Viva 742".into()],
            logo: None,
        }
    }

    fn photo(index: usize) -> Attachment {
        Attachment {
            filename: format!("foto-{index}.png"),
            bytes: Bytes::from(png_bytes(40, 30, [200, 10, 10, 255])),
        }
    }

    fn texts(pages: &[layout::Page]) -> Vec<String> {
        pages
            .iter()
            .flat_map(|page| page.ops.iter())
            .filter_map(|op| match op {
                DrawOp::Text { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    fn layout_for(order: &Order, photos: usize) -> Vec<layout::Page> {
        let letterhead = letterhead();
        layout::build_pages(&LayoutInput {
            order,
            letterhead: &letterhead,
            logo: None,
            customer_signature: None,
            technician_signature: None,
            photos: vec![
                Some(ImageRef {
                    index: 0,
                    width: 4,
                    height: 3,
                });
                photos
            ],
        })
    }

    #[test]
    fn rendering_is_deterministic() {
        let order = sample_order();
        let first = render_order(&order, &[], &letterhead()).unwrap();
        let second = render_order(&order, &[], &letterhead()).unwrap();
        assert_eq!(first.bytes, second.bytes);
        assert_eq!(first.page_count, 1);
    }

    #[test]
    fn photos_add_one_page_per_four() {
        let order = sample_order();
        for (count, expected_pages) in [(0, 1), (1, 2), (4, 2), (5, 3), (8, 3), (9, 4)] {
            let attachments: Vec<Attachment> = (0..count).map(photo).collect();
            let rendered = render_order(&order, &attachments, &letterhead()).unwrap();
            assert_eq!(rendered.page_count, expected_pages, "{count} photos");

            let parsed = Document::load_mem(&rendered.bytes).unwrap();
            assert_eq!(parsed.get_pages().len(), expected_pages);
        }
        assert_eq!(PHOTOS_PER_PAGE, 4);
    }

    #[test]
    fn discount_adds_a_line_and_keeps_the_total() {
        let mut order = sample_order();
        let plain = texts(&layout_for(&order, 0));
        assert!(plain.iter().any(|text| text == "$1,000.00"));
        assert!(!plain.iter().any(|text| text.contains("Total con descuento")));

        order.discount = true;
        let discounted = texts(&layout_for(&order, 0));
        assert!(discounted.iter().any(|text| text == "$1,000.00"));
        assert!(discounted.iter().any(|text| text.contains("Total con descuento (10%)")));
        assert!(discounted.iter().any(|text| text == "$900.00"));
    }

    #[test]
    fn absent_signatures_draw_nothing() {
        let order = sample_order();
        let pages = layout_for(&order, 0);
        let labels = texts(&pages);
        assert!(!labels.iter().any(|text| text.starts_with("Firma del")));
        assert!(!pages[0]
            .ops
            .iter()
            .any(|op| matches!(op, DrawOp::Image { .. })));
    }

    #[test]
    fn present_signature_is_drawn_with_its_label() {
        let mut order = sample_order();
        order.customer_signature = Some(png_data_url(120, 40));
        let rendered = render_order(&order, &[], &letterhead()).unwrap();
        assert!(rendered.skipped_images.is_empty());

        let letterhead = letterhead();
        let pages = layout::build_pages(&LayoutInput {
            order: &order,
            letterhead: &letterhead,
            logo: None,
            customer_signature: Some(ImageRef {
                index: 0,
                width: 120,
                height: 40,
            }),
            technician_signature: None,
            photos: Vec::new(),
        });
        let labels = texts(&pages);
        assert!(labels.iter().any(|text| text == "Firma del cliente"));
        assert!(!labels.iter().any(|text| text == "Firma del técnico"));
    }

    #[test]
    fn broken_images_are_reported_and_rendering_continues() {
        let mut order = sample_order();
        order.technician_signature = Some("data:image/png;base64,AAAA".into());
        let attachments = vec![
            photo(0),
            Attachment {
                filename: "roto.jpg".into(),
                bytes: Bytes::from_static(b"not a jpeg"),
            },
        ];

        let rendered = render_order(&order, &attachments, &letterhead()).unwrap();
        assert_eq!(rendered.page_count, 2);
        let slots: Vec<ImageSlot> = rendered.skipped_images.iter().map(|s| s.slot).collect();
        assert_eq!(slots, vec![ImageSlot::TechnicianSignature, ImageSlot::Photo(1)]);
    }

    #[test]
    fn footer_numbers_every_page() {
        let order = sample_order();
        let labels = texts(&layout_for(&order, 5));
        assert!(labels.iter().any(|text| text == "Página 1 de 3"));
        assert!(labels.iter().any(|text| text == "Página 3 de 3"));
    }

    #[tokio::test]
    async fn timed_render_returns_the_document() {
        let rendered = render_with_timeout(
            sample_order(),
            vec![photo(0)],
            Arc::new(letterhead()),
            Duration::from_secs(30),
        )
        .await
        .unwrap();
        assert_eq!(rendered.page_count, 2);
    }
}
