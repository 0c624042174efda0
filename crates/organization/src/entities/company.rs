use serde::{Deserialize, Serialize};

pub type CompanyId = String;

/// Organization that employees are invited into. Read-only reference data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub id: CompanyId,
    pub name: String,
    pub domain: String,
    pub logo_url: Option<String>,
    pub industry: Option<String>,
}

impl Company {
    pub fn new(name: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            id: cuid2::create_id(),
            name: name.into(),
            domain: domain.into(),
            logo_url: None,
            industry: None,
        }
    }
}
