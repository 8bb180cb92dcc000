use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};

use super::images::RasterImage;
use super::layout::{DrawOp, Font, Page, PAGE_HEIGHT, PAGE_WIDTH};

const REGULAR_FONT: &str = "F1";
const BOLD_FONT: &str = "F2";

/// Encodes laid-out pages. `images[i]` is the raster referenced by
/// `DrawOp::Image { image: i, .. }`.
///
/// No creation date or document id is written, so equal input yields equal
/// bytes.
pub fn encode(pages: &[Page], images: &[RasterImage]) -> Result<Vec<u8>, lopdf::Error> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let regular_id = doc.add_object(font_dictionary("Helvetica"));
    let bold_id = doc.add_object(font_dictionary("Helvetica-Bold"));

    let image_ids: Vec<ObjectId> = images
        .iter()
        .map(|image| doc.add_object(image_stream(image)))
        .collect();

    let mut kids = Vec::with_capacity(pages.len());
    for page in pages {
        let content = Content {
            operations: page_operations(page),
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));

        let mut xobjects = Dictionary::new();
        for index in used_images(page) {
            if let Some(id) = image_ids.get(index) {
                xobjects.set(image_name(index), *id);
            }
        }

        let resources = dictionary! {
            "Font" => dictionary! {
                REGULAR_FONT => regular_id,
                BOLD_FONT => bold_id,
            },
            "XObject" => xobjects,
        };

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources,
        });
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => Object::Integer(count),
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(PAGE_WIDTH),
                Object::Real(PAGE_HEIGHT),
            ],
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)?;
    Ok(bytes)
}

fn font_dictionary(base_font: &str) -> Dictionary {
    dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => base_font,
        "Encoding" => "WinAnsiEncoding",
    }
}

fn image_stream(image: &RasterImage) -> Stream {
    Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => Object::Integer(i64::from(image.width)),
            "Height" => Object::Integer(i64::from(image.height)),
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => Object::Integer(8),
        },
        image.rgb.clone(),
    )
}

fn image_name(index: usize) -> String {
    format!("Im{index}")
}

fn used_images(page: &Page) -> Vec<usize> {
    let mut used: Vec<usize> = page
        .ops
        .iter()
        .filter_map(|op| match op {
            DrawOp::Image { image, .. } => Some(*image),
            _ => None,
        })
        .collect();
    used.sort_unstable();
    used.dedup();
    used
}

fn real(value: f32) -> Object {
    Object::Real(value)
}

/// Layout works top-down; PDF user space grows upwards.
fn flip(y: f32) -> f32 {
    PAGE_HEIGHT - y
}

fn page_operations(page: &Page) -> Vec<Operation> {
    let mut ops = Vec::new();
    for op in &page.ops {
        match op {
            DrawOp::Text {
                x,
                y,
                size,
                font,
                text,
            } => {
                let font_name = match font {
                    Font::Regular => REGULAR_FONT,
                    Font::Bold => BOLD_FONT,
                };
                ops.push(Operation::new("BT", vec![]));
                ops.push(Operation::new("Tf", vec![font_name.into(), real(*size)]));
                ops.push(Operation::new("Td", vec![real(*x), real(flip(*y))]));
                ops.push(Operation::new(
                    "Tj",
                    vec![Object::String(win_ansi(text), StringFormat::Literal)],
                ));
                ops.push(Operation::new("ET", vec![]));
            }
            DrawOp::Line {
                x1,
                y1,
                x2,
                y2,
                width,
            } => {
                ops.push(Operation::new("w", vec![real(*width)]));
                ops.push(Operation::new("m", vec![real(*x1), real(flip(*y1))]));
                ops.push(Operation::new("l", vec![real(*x2), real(flip(*y2))]));
                ops.push(Operation::new("S", vec![]));
            }
            DrawOp::Rect {
                x,
                y,
                width,
                height,
                fill,
                stroke,
            } => {
                let painter = match (fill, stroke) {
                    (Some(_), true) => "B",
                    (Some(_), false) => "f",
                    (None, true) => "S",
                    (None, false) => continue,
                };
                ops.push(Operation::new("q", vec![]));
                if let Some(gray) = fill {
                    ops.push(Operation::new("g", vec![real(*gray)]));
                }
                ops.push(Operation::new("w", vec![real(0.6)]));
                ops.push(Operation::new(
                    "re",
                    vec![real(*x), real(flip(*y + *height)), real(*width), real(*height)],
                ));
                ops.push(Operation::new(painter, vec![]));
                ops.push(Operation::new("Q", vec![]));
            }
            DrawOp::Image {
                image,
                x,
                y,
                width,
                height,
            } => {
                ops.push(Operation::new("q", vec![]));
                ops.push(Operation::new(
                    "cm",
                    vec![
                        real(*width),
                        real(0.0),
                        real(0.0),
                        real(*height),
                        real(*x),
                        real(flip(*y + *height)),
                    ],
                ));
                ops.push(Operation::new("Do", vec![Object::Name(image_name(*image).into_bytes())]));
                ops.push(Operation::new("Q", vec![]));
            }
        }
    }
    ops
}

/// Base-14 fonts only cover WinAnsi; Spanish accents map directly, a few
/// punctuation marks are remapped and anything else becomes `?`.
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|ch| match ch {
            '\u{20}'..='\u{7e}' | '\u{a0}'..='\u{ff}' => ch as u32 as u8,
            '€' => 0x80,
            '…' => 0x85,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '•' => 0x95,
            '–' => 0x96,
            '—' => 0x97,
            _ => b'?',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spanish_text_maps_to_win_ansi() {
        assert_eq!(win_ansi("Año"), vec![b'A', 0xf1, b'o']);
        assert_eq!(win_ansi("Técnico…"), vec![b'T', 0xe9, b'c', b'n', b'i', b'c', b'o', 0x85]);
        assert_eq!(win_ansi("✓"), vec![b'?']);
    }

    #[test]
    fn encodes_one_pdf_page_per_layout_page() {
        let mut page = Page::default();
        page.ops.push(DrawOp::Text {
            x: 40.0,
            y: 40.0,
            size: 10.0,
            font: Font::Bold,
            text: "Folio: OR-0001".into(),
        });
        page.ops.push(DrawOp::Image {
            image: 0,
            x: 40.0,
            y: 80.0,
            width: 20.0,
            height: 10.0,
        });
        let image = RasterImage {
            width: 2,
            height: 1,
            rgb: vec![0, 0, 0, 255, 255, 255],
        };

        let bytes = encode(&[page.clone(), Page::default(), page], &[image]).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));

        let parsed = Document::load_mem(&bytes).unwrap();
        assert_eq!(parsed.get_pages().len(), 3);
    }
}
