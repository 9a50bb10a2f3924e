// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Translation of print options into backend directives.
//
// Only non-default settings become directives: some backends reject values
// they do not support even when those values are the default, so A4 paper
// and one-sided printing are never spelled out.

use labprint_core::page_range::PageSet;
use labprint_core::types::{DuplexMode, PaperSize, PrintOptions};

/// One setting a print backend must be told about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    Copies(u32),
    Sides(DuplexMode),
    Paper(PaperSize),
    Monochrome,
    /// Canonical range string, never user input.
    PageRanges(String),
}

/// Directives for `options`; `pages` is the resolved page set, `None` or a
/// full set meaning every page.
pub fn translate(options: &PrintOptions, pages: Option<&PageSet>, total_pages: u32) -> Vec<Directive> {
    let mut out = Vec::new();
    if options.copies > 1 {
        out.push(Directive::Copies(options.copies));
    }
    if let Some(pages) = pages {
        if !pages.is_empty() && !pages.covers_all(total_pages) {
            out.push(Directive::PageRanges(pages.to_canonical_string()));
        }
    }
    if options.duplex != DuplexMode::OneSided {
        out.push(Directive::Sides(options.duplex));
    }
    if options.paper != PaperSize::A4 {
        out.push(Directive::Paper(options.paper));
    }
    if options.color.is_grayscale() {
        out.push(Directive::Monochrome);
    }
    out
}

/// CUPS `lp` arguments (everything between `-d PRINTER` and the file).
pub fn lp_args(directives: &[Directive]) -> Vec<String> {
    let mut args = Vec::new();
    for directive in directives {
        match directive {
            Directive::Copies(n) => {
                args.push("-n".into());
                args.push(n.to_string());
            }
            Directive::PageRanges(range) => {
                args.push("-o".into());
                args.push(format!("page-ranges={range}"));
            }
            Directive::Sides(mode) => {
                args.push("-o".into());
                args.push(format!("sides={}", mode.sides_keyword()));
            }
            Directive::Paper(paper) => {
                args.push("-o".into());
                args.push(format!("media={}", paper.keyword()));
            }
            Directive::Monochrome => {
                args.push("-o".into());
                args.push("print-color-mode=monochrome".into());
            }
        }
    }
    args
}

/// SumatraPDF `-print-settings` value; empty when nothing needs saying.
pub fn sumatra_settings(directives: &[Directive]) -> String {
    directives
        .iter()
        .map(|directive| match directive {
            Directive::Copies(n) => format!("{n}x"),
            Directive::PageRanges(range) => range.clone(),
            Directive::Sides(DuplexMode::TwoSidedShortEdge) => "duplexshort".into(),
            Directive::Sides(_) => "duplexlong".into(),
            Directive::Paper(paper) => format!("paper={}", paper.keyword()),
            Directive::Monochrome => "monochrome".into(),
        })
        .collect::<Vec<_>>()
        .join(",")
}
