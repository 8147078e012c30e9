//! Deterministic status classification for auction records.
//!
//! The validator is the only component that decides where a record is
//! routed. It normalizes a copy of the input, collects structured errors
//! and classifies the outcome with a fixed decision table:
//!
//! | condition                                         | status       |
//! |---------------------------------------------------|--------------|
//! | no errors, or only normalization notices          | VALID        |
//! | any invalid date / invalid URL                    | REJECTED     |
//! | only `data_leilao` missing                        | NOT_SELLABLE |
//! | any other missing required field                  | DRAFT        |

mod validator;

pub use validator::{validate_record, ValidationResult, REQUIRED_FIELDS};
