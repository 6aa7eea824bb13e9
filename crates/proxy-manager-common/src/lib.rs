pub mod validation;

pub use validation::{
    normalize_domain, validate_domain, validate_target_url, ValidationError, ValidationResult,
};
