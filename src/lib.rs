//! Core library for the datahub-sheets command line application.
//!
//! The library keeps workbooks in a canonical in-memory form and exposes the
//! operations the CLI and the tests drive: the spreadsheet codec lives under
//! [`datahub::sheets::io`], data representations inside
//! [`datahub::sheets::model`], request checks in [`datahub::sheets::validate`],
//! the merge engine in [`datahub::sheets::merge`], file handling in
//! [`datahub::sheets::persist`], and the end-to-end operations under
//! [`datahub::sheets::pipeline`].

pub mod datahub;

pub use datahub::sheets::{
    Result, SheetError, config, error, io, merge, model, persist, pipeline, validate,
};
