use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Company {
    pub id: i32,
    pub name: String,
    pub rating: Option<String>,
    pub reviews: Option<String>,
    pub logo_url: Option<String>,
}

/// Descriptive fields of a company as seen on a listing. Identity is the
/// trimmed name; the other fields refresh the stored record when present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompanyProfile {
    pub name: String,
    pub rating: Option<String>,
    pub reviews: Option<String>,
    pub logo_url: Option<String>,
}

impl CompanyProfile {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Lookup key shared by every store implementation.
    pub fn key(&self) -> String {
        self.name.trim().to_lowercase()
    }
}

impl Company {
    /// Apply a freshly scraped profile, keeping prior values for fields the
    /// listing did not carry.
    pub fn refresh(&mut self, profile: &CompanyProfile) {
        if profile.rating.is_some() {
            self.rating.clone_from(&profile.rating);
        }
        if profile.reviews.is_some() {
            self.reviews.clone_from(&profile.reviews);
        }
        if profile.logo_url.is_some() {
            self.logo_url.clone_from(&profile.logo_url);
        }
    }
}
