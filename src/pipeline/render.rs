//! Sheet writer: emit laid-out pages as a PDF.
//!
//! ## Why embed JPEG?
//!
//! PDF readers decode `DCTDecode` streams natively, so a JPEG can be written
//! into the file as-is with no re-compression. At quality 95 a 300 dpi card
//! is a few hundred KB instead of the 2.3 MB a raw RGB stream would take, and
//! the difference is not visible in print.
//!
//! ## Why spawn_blocking?
//!
//! JPEG encoding a full sheet is CPU-bound for hundreds of milliseconds.
//! [`render_pdf`] moves it onto the blocking pool so Tokio worker threads
//! keep servicing network I/O.
//!
//! Each distinct bitmap becomes a single image XObject. Four copies of a
//! card reference the same object, so file size grows with the number of
//! unique cards, not with quantities.

use super::layout::{Page, SheetLayout};
use super::normalize::NormalizedImage;
use crate::error::ProxyError;
use image::codecs::jpeg::JpegEncoder;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use tracing::debug;

/// JPEG quality used for embedded card images.
pub const JPEG_QUALITY: u8 = 95;

/// Encode `pages` as a PDF on the blocking pool and return the bytes.
pub async fn render_pdf(pages: Vec<Page>, layout: SheetLayout) -> Result<Vec<u8>, ProxyError> {
    tokio::task::spawn_blocking(move || {
        let mut buf = Vec::new();
        write_pdf(&pages, &layout, &mut buf)?;
        Ok::<_, ProxyError>(buf)
    })
    .await
    .map_err(|e| ProxyError::Internal(format!("PDF task panicked: {}", e)))?
}

/// Write one PDF page per [`Page`], sized to the layout's page.
pub fn write_pdf<W: Write>(
    pages: &[Page],
    layout: &SheetLayout,
    out: &mut W,
) -> Result<(), ProxyError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let (card_w, card_h) = layout.card.points();

    let mut xobjects: HashMap<*const NormalizedImage, (ObjectId, String)> = HashMap::new();
    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());

    for page in pages {
        let mut resources = Dictionary::new();
        let mut operations = Vec::with_capacity(page.placements.len() * 4);

        for placement in &page.placements {
            let key = Arc::as_ptr(&placement.image);
            let (image_id, name) = match xobjects.get(&key) {
                Some(entry) => entry.clone(),
                None => {
                    let name = format!("Im{}", xobjects.len() + 1);
                    let id = doc.add_object(image_xobject(&placement.image)?);
                    xobjects.insert(key, (id, name.clone()));
                    (id, name)
                }
            };

            resources.set(name.as_bytes().to_vec(), image_id);
            operations.push(Operation::new("q", vec![]));
            operations.push(Operation::new(
                "cm",
                vec![
                    card_w.into(),
                    Object::Integer(0),
                    Object::Integer(0),
                    card_h.into(),
                    placement.x_pt.into(),
                    placement.y_pt.into(),
                ],
            ));
            operations.push(Operation::new("Do", vec![Object::Name(name.into_bytes())]));
            operations.push(Operation::new("Q", vec![]));
        }

        let content = Content { operations }
            .encode()
            .map_err(|e| ProxyError::PdfWriteFailed(e.to_string()))?;
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                layout.page_width_pt.into(),
                layout.page_height_pt.into(),
            ],
            "Resources" => dictionary! { "XObject" => resources },
            "Contents" => content_id,
        });
        kids.push(page_id.into());
        debug!("PDF page {}: {} cards", page.number, page.placements.len());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    doc.save_to(out)
        .map_err(|e| ProxyError::PdfWriteFailed(e.to_string()))?;
    debug!("PDF written: {} pages, {} distinct images", count, xobjects.len());
    Ok(())
}

fn image_xobject(image: &NormalizedImage) -> Result<Stream, ProxyError> {
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY)
        .encode_image(image.as_rgb())
        .map_err(|e| ProxyError::PdfWriteFailed(format!("JPEG encoding failed: {}", e)))?;

    Ok(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => image.width() as i64,
            "Height" => image.height() as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8i64,
            "Filter" => "DCTDecode",
        },
        jpeg,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::layout::{paginate, RenderedCard};
    use crate::pipeline::normalize::normalize;
    use image::{DynamicImage, Rgb, RgbImage};

    fn card(shade: u8) -> Arc<NormalizedImage> {
        let src = DynamicImage::ImageRgb8(RgbImage::from_pixel(25, 35, Rgb([shade, 0, 0])));
        Arc::new(normalize(&src, 25, 35))
    }

    fn image_streams(doc: &Document) -> Vec<&Stream> {
        doc.objects
            .values()
            .filter_map(|o| match o {
                Object::Stream(s) => Some(s),
                _ => None,
            })
            .filter(|s| matches!(s.dict.get(b"Subtype"), Ok(Object::Name(n)) if n == b"Image"))
            .collect()
    }

    #[test]
    fn one_pdf_page_per_layout_page() {
        let red = card(200);
        let blue = card(20);
        let mut cards: Vec<_> = (0..7).map(|_| RenderedCard::new("OP01-001", Arc::clone(&red))).collect();
        cards.extend((0..3).map(|_| RenderedCard::new("ST01-012", Arc::clone(&blue))));

        let layout = SheetLayout::default();
        let pages = paginate(&cards, &layout);
        let mut buf = Vec::new();
        write_pdf(&pages, &layout, &mut buf).unwrap();

        let doc = Document::load_mem(&buf).unwrap();
        assert_eq!(doc.get_pages().len(), 2);
        // Quantities share one XObject per distinct bitmap.
        assert_eq!(image_streams(&doc).len(), 2);
    }

    #[test]
    fn images_are_embedded_as_jpeg() {
        let layout = SheetLayout::default();
        let pages = paginate(&[RenderedCard::new("Nami", card(90))], &layout);
        let mut buf = Vec::new();
        write_pdf(&pages, &layout, &mut buf).unwrap();

        let doc = Document::load_mem(&buf).unwrap();
        let streams = image_streams(&doc);
        assert_eq!(streams.len(), 1);
        assert_eq!(&streams[0].content[..2], &[0xFF, 0xD8]);
        assert!(matches!(streams[0].dict.get(b"Width"), Ok(Object::Integer(25))));
    }

    #[test]
    fn page_uses_layout_media_box() {
        let layout = SheetLayout::default();
        let pages = paginate(&[RenderedCard::new("Nami", card(90))], &layout);
        let mut buf = Vec::new();
        write_pdf(&pages, &layout, &mut buf).unwrap();

        let doc = Document::load_mem(&buf).unwrap();
        let (_, page_id) = doc.get_pages().into_iter().next().unwrap();
        let page = doc.get_dictionary(page_id).unwrap();
        let media_box = page.get(b"MediaBox").unwrap().as_array().unwrap();
        assert_eq!(media_box.len(), 4);
        assert!(matches!(media_box[2], Object::Real(w) if (w - 612.0).abs() < 0.01));
        assert!(matches!(media_box[3], Object::Real(h) if (h - 792.0).abs() < 0.01));
    }

    #[tokio::test]
    async fn render_pdf_runs_off_thread() {
        let layout = SheetLayout::default();
        let pages = paginate(&[RenderedCard::new("Nami", card(90))], &layout);
        let bytes = render_pdf(pages, layout).await.unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));
    }
}
