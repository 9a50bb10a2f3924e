// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF reader: page count and page geometry of a printable document using
// the `lopdf` crate.

use std::path::Path;

use labprint_core::error::{LabprintError, Result};
use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::{debug, instrument};

/// US Letter in points, used when a page carries no usable MediaBox.
const FALLBACK_PAGE_PT: (f32, f32) = (612.0, 792.0);

/// Guard against cyclic /Parent chains in damaged files.
const MAX_TREE_DEPTH: usize = 32;

/// Read-only view of a PDF document.
pub struct PdfReader {
    document: Document,
}

impl PdfReader {
    // -- Construction ---------------------------------------------------------

    /// Open a PDF from the filesystem.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path_ref = path.as_ref();
        let document = Document::load(path_ref).map_err(|err| {
            LabprintError::PdfError(format!("failed to open {}: {}", path_ref.display(), err))
        })?;
        debug!(pages = document.get_pages().len(), "PDF loaded");
        Ok(Self { document })
    }

    /// Create a reader from raw PDF bytes already in memory.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let document = Document::load_mem(data).map_err(|err| {
            LabprintError::PdfError(format!("failed to load PDF from memory: {}", err))
        })?;
        Ok(Self { document })
    }

    // -- Inspection -----------------------------------------------------------

    /// Number of pages in the document.
    pub fn page_count(&self) -> u32 {
        self.document.get_pages().len() as u32
    }

    /// Visible size of a page (1-indexed) in points, with /Rotate applied.
    pub fn page_size_pt(&self, page_number: u32) -> Result<(f32, f32)> {
        let pages = self.document.get_pages();
        let page_id = *pages.get(&page_number).ok_or_else(|| {
            LabprintError::PdfError(format!(
                "page {} out of range (document has {} pages)",
                page_number,
                pages.len()
            ))
        })?;

        let (w, h) = self
            .inherited(page_id, b"MediaBox")
            .and_then(|obj| rect_size(&self.document, obj))
            .unwrap_or(FALLBACK_PAGE_PT);
        let rotate = self
            .inherited(page_id, b"Rotate")
            .and_then(|obj| number(&self.document, obj))
            .unwrap_or(0.0) as i64;

        if rotate.rem_euclid(180) == 90 {
            Ok((h, w))
        } else {
            Ok((w, h))
        }
    }

    /// Look up a page attribute, walking /Parent for inheritable keys.
    fn inherited(&self, page_id: ObjectId, key: &[u8]) -> Option<&Object> {
        let mut dict = self.dictionary(page_id)?;
        for _ in 0..MAX_TREE_DEPTH {
            if let Ok(value) = dict.get(key) {
                return Some(value);
            }
            let parent = match dict.get(b"Parent") {
                Ok(Object::Reference(id)) => *id,
                _ => return None,
            };
            dict = self.dictionary(parent)?;
        }
        None
    }

    fn dictionary(&self, id: ObjectId) -> Option<&Dictionary> {
        self.document.get_object(id).ok()?.as_dict().ok()
    }
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

fn number(doc: &Document, obj: &Object) -> Option<f32> {
    match resolve(doc, obj)? {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

fn rect_size(doc: &Document, obj: &Object) -> Option<(f32, f32)> {
    let Object::Array(items) = resolve(doc, obj)? else {
        return None;
    };
    if items.len() != 4 {
        return None;
    }
    let coords: Vec<f32> = items
        .iter()
        .map(|item| number(doc, item))
        .collect::<Option<_>>()?;
    let w = (coords[2] - coords[0]).abs();
    let h = (coords[3] - coords[1]).abs();
    if w > 0.0 && h > 0.0 { Some((w, h)) } else { None }
}
