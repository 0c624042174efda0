pub mod validation;

pub use validation::normalize_email;
