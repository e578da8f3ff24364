//! Builds small PDFs on the fly so tests need no fixture files.

#![allow(dead_code)]

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::path::{Path, PathBuf};

/// One page of a generated PDF.
pub enum TestPage<'a> {
    /// A page showing `text` in Helvetica.
    Text(&'a str),
    /// A page with an empty content stream, as a scanned page looks to a
    /// text extractor.
    ImageOnly,
}

/// Write a PDF with the given pages to `dir/name` and return its path.
pub fn write_pdf(dir: &Path, name: &str, pages: &[TestPage<'_>]) -> PathBuf {
    let path = dir.join(name);
    let mut doc = build_pdf(pages);
    doc.save(&path).expect("save generated PDF");
    path
}

/// The same PDF as [`write_pdf`], in memory.
pub fn pdf_bytes(pages: &[TestPage<'_>]) -> Vec<u8> {
    let mut doc = build_pdf(pages);
    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("serialise generated PDF");
    bytes
}

fn build_pdf(pages: &[TestPage<'_>]) -> Document {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for page in pages {
        let operations = match page {
            TestPage::Text(text) => vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 14.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
            TestPage::ImageOnly => vec![],
        };
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("encode content stream"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc
}
