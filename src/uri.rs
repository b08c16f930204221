//! The `guide://` URI scheme (`spec.md` §6 "URI scheme"): identifies a
//! content resource by collection and an optional document path.

use std::str::FromStr;

use url::Url;

use crate::error::CoreError;

const SCHEME: &str = "guide";

/// A parsed `guide://<collection>[/<document-path>]` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuideUri {
    pub collection: String,
    pub document_path: String,
}

impl FromStr for GuideUri {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(s).map_err(|e| CoreError::Validation {
            fields: vec![("uri".to_string(), format!("could not parse '{s}': {e}"))],
        })?;

        if url.scheme() != SCHEME {
            return Err(CoreError::Validation {
                fields: vec![("uri".to_string(), format!("expected scheme '{SCHEME}', got '{}'", url.scheme()))],
            });
        }

        let collection = url.host_str().unwrap_or("").to_string();
        if collection.is_empty() {
            return Err(CoreError::Validation {
                fields: vec![("uri".to_string(), "collection (host component) must be non-empty".to_string())],
            });
        }

        let document_path = url.path().trim_start_matches('/').to_string();

        Ok(GuideUri { collection, document_path })
    }
}
