//! Sheet evaluation pipeline.
//!
//! This module wires the stages together for one sheet:
//! preprocess -> align -> grid -> classify -> score -> report.
//!
//! The algorithms live in their own modules (`crate::preprocess`,
//! `crate::align`, `crate::grid`, `crate::classify`, `crate::scoring`,
//! `crate::report`); the pipeline layer owns validation order, call order and
//! stage logging.

mod run;
#[cfg(test)]
mod tests;

pub(crate) use run::{run_sheet, validate_inputs};
