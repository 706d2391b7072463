//! Fixed product category enumeration

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Product category. The set is closed; there is no server-side mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Herbal,
    PalmJaggery,
    Coir,
    Tea,
    HealthMix,
    Handicraft,
    Egg,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Herbal,
        Category::PalmJaggery,
        Category::Coir,
        Category::Tea,
        Category::HealthMix,
        Category::Handicraft,
        Category::Egg,
    ];

    /// URL path segment, identical to the serialized value
    pub fn path(&self) -> &'static str {
        match self {
            Category::Herbal => "herbal",
            Category::PalmJaggery => "palm-jaggery",
            Category::Coir => "coir",
            Category::Tea => "tea",
            Category::HealthMix => "health-mix",
            Category::Handicraft => "handicraft",
            Category::Egg => "egg",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Category::Herbal => "Herbal Products",
            Category::PalmJaggery => "Palm Jaggery",
            Category::Coir => "Coir Products",
            Category::Tea => "Tea",
            Category::HealthMix => "Health Mix",
            Category::Handicraft => "Handicrafts",
            Category::Egg => "Eggs",
        }
    }

    /// Icon tag understood by the frontend icon set
    pub fn icon(&self) -> &'static str {
        match self {
            Category::Herbal => "leaf",
            Category::PalmJaggery => "cube",
            Category::Coir => "rope",
            Category::Tea => "mug",
            Category::HealthMix => "bowl",
            Category::Handicraft => "palette",
            Category::Egg => "egg",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Category::Herbal => "Botanical extracts, powders and dried herbs",
            Category::PalmJaggery => "Unrefined sweeteners made from palm sap",
            Category::Coir => "Fibre, yarn and mats made from coconut husk",
            Category::Tea => "Leaf and blended teas",
            Category::HealthMix => "Multigrain and millet nutrition mixes",
            Category::Handicraft => "Handmade decor and utility items",
            Category::Egg => "Table eggs graded for export",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        Category::ALL
            .into_iter()
            .find(|c| c.path() == needle)
            .ok_or_else(|| Error::InvalidCategory(needle.to_string()))
    }
}

/// Public description of a category
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryInfo {
    pub path: &'static str,
    pub name: &'static str,
    pub icon: &'static str,
    pub description: &'static str,
}

impl From<Category> for CategoryInfo {
    fn from(category: Category) -> Self {
        Self {
            path: category.path(),
            name: category.display_name(),
            icon: category.icon(),
            description: category.description(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_every_category() {
        for category in Category::ALL {
            assert_eq!(category.path().parse::<Category>().unwrap(), category);
        }
    }

    #[test]
    fn test_reject_unknown_category() {
        let err = "spices".parse::<Category>().unwrap_err();
        assert!(matches!(err, Error::InvalidCategory(ref c) if c == "spices"));
    }

    #[test]
    fn test_serde_uses_path() {
        let json = serde_json::to_string(&Category::PalmJaggery).unwrap();
        assert_eq!(json, "\"palm-jaggery\"");

        let parsed: Category = serde_json::from_str("\"health-mix\"").unwrap();
        assert_eq!(parsed, Category::HealthMix);
    }
}
