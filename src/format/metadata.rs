//! Slide-level metadata from the TIFF `ImageDescription` tag.
//!
//! Aperio writes a pipe-separated description:
//!
//! ```text
//! Aperio Image Library v11.2.1
//! 46000x32914 [0,100 46000x32814] (256x256) JPEG/RGB Q=30|AppMag = 20|MPP = 0.4990
//! ```

use std::collections::HashMap;

/// Vendor metadata parsed from the base level's description.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlideMetadata {
    /// Microns per pixel at level 0
    pub mpp: Option<f64>,

    /// Objective magnification (e.g., 20, 40)
    pub magnification: Option<f64>,

    /// Scanner vendor name
    pub vendor: Option<String>,

    /// All `key = value` pairs
    pub properties: HashMap<String, String>,
}

impl SlideMetadata {
    pub fn parse(description: &str) -> Self {
        let mut metadata = SlideMetadata::default();

        if description.contains("Aperio") {
            metadata.vendor = Some("Aperio".to_string());
        }

        for part in description.split('|') {
            let Some((key, value)) = part.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim();

            match key {
                "MPP" => metadata.mpp = value.parse().ok().filter(|v: &f64| *v > 0.0),
                "AppMag" => metadata.magnification = value.parse().ok(),
                _ => {}
            }
            metadata
                .properties
                .insert(key.to_string(), value.to_string());
        }

        metadata
    }
}
