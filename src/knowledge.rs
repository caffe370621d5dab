//! Disease knowledge table
//!
//! Static cause and treatment guidance for every class label. The catalog is
//! built once at startup and only read afterwards.

use std::collections::HashMap;

use serde::Serialize;

use crate::labels::CLASS_NAMES;

/// Cause shown when a label has no entry
pub const UNKNOWN_CAUSE: &str = "No information available.";

/// Recommendation shown when a label has no entry
pub const UNKNOWN_RECOMMENDATION: &str = "No recommendations available.";

/// Cause and recommendations for a single class
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiseaseInfo {
    pub cause: String,
    pub recommendations: Vec<String>,
}

impl DiseaseInfo {
    pub fn new(cause: &str, recommendations: &[&str]) -> Self {
        Self {
            cause: cause.to_string(),
            recommendations: recommendations.iter().map(|r| r.to_string()).collect(),
        }
    }

    /// Placeholder for labels outside the catalog
    pub fn unknown() -> Self {
        Self::new(UNKNOWN_CAUSE, &[UNKNOWN_RECOMMENDATION])
    }
}

const BUILTIN_ENTRIES: [(&str, &str, [&str; 3]); 10] = [
    (
        "Tomato___Bacterial_spot",
        "Caused by bacteria Xanthomonas campestris pv. vesicatoria. It leads to small, water-soaked spots on leaves and fruit.",
        [
            "Use copper-based fungicides.",
            "Remove and destroy infected plant parts.",
            "Avoid overhead watering to reduce spread.",
        ],
    ),
    (
        "Tomato___Early_blight",
        "Caused by the fungus Alternaria solani. Characterized by target-like spots on older leaves.",
        [
            "Apply fungicides containing mancozeb or chlorothalonil.",
            "Ensure good air circulation.",
            "Prune lower leaves to prevent soil splash.",
        ],
    ),
    (
        "Tomato___Late_blight",
        "A destructive disease caused by the oomycete Phytophthora infestans. It thrives in cool, wet conditions.",
        [
            "Apply fungicides preventively.",
            "Remove and destroy all infected plant material.",
            "Space plants properly for air circulation.",
        ],
    ),
    (
        "Tomato___Leaf_Mold",
        "Caused by the fungus Fulvia fulva. It primarily affects leaves, causing olive-green velvety patches on the underside.",
        [
            "Improve air circulation and reduce humidity.",
            "Use fungicides with azoxystrobin or pyraclostrobin.",
            "Plant resistant tomato varieties.",
        ],
    ),
    (
        "Tomato___Septoria_leaf_spot",
        "A fungal disease caused by Septoria lycopersici. It forms small, circular spots with dark borders and gray centers.",
        [
            "Apply fungicides containing chlorothalonil or mancozeb.",
            "Practice crop rotation.",
            "Keep plants off the ground and use mulch.",
        ],
    ),
    (
        "Tomato___Spider_mites",
        "Caused by tiny arachnids, usually Tetranychus urticae. They suck sap, leading to stippling and webbing on leaves.",
        [
            "Use insecticidal soaps or horticultural oils.",
            "Release beneficial predatory mites.",
            "Hose down plants with a strong stream of water.",
        ],
    ),
    (
        "Tomato___Target_Spot",
        "Caused by the fungus Corynespora cassiicola. It creates small, dark, circular spots on leaves that resemble targets.",
        [
            "Apply fungicides.",
            "Remove crop residue.",
            "Avoid splashing water on foliage.",
        ],
    ),
    (
        "Tomato___Tomato_Yellow_Leaf_Curl_Virus",
        "A viral disease transmitted by whiteflies (Bemisia tabaci). It causes upward curling and yellowing of leaves.",
        [
            "Control whitefly populations with insecticides.",
            "Use reflective mulches.",
            "Plant resistant varieties.",
        ],
    ),
    (
        "Tomato___Tomato_mosaic_virus",
        "A viral disease that causes mottled, light, and dark green patterns on leaves, often leading to stunted growth.",
        [
            "Remove and destroy infected plants.",
            "Disinfect tools and hands after handling infected plants.",
            "Use virus-free seeds and transplants.",
        ],
    ),
    (
        "Tomato___healthy",
        "The plant shows no signs of disease and appears to be in good health.",
        [
            "Continue with proper plant care.",
            "Ensure adequate watering and sunlight.",
            "Monitor the plant regularly for any signs of stress or disease.",
        ],
    ),
];

/// Read-only mapping from class label to guidance
#[derive(Debug, Clone)]
pub struct DiseaseCatalog {
    entries: HashMap<String, DiseaseInfo>,
    unknown: DiseaseInfo,
}

impl Default for DiseaseCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl DiseaseCatalog {
    /// Catalog covering every label in [`CLASS_NAMES`]
    pub fn builtin() -> Self {
        let entries = BUILTIN_ENTRIES
            .iter()
            .map(|(label, cause, recs)| (label.to_string(), DiseaseInfo::new(cause, recs)))
            .collect();

        Self {
            entries,
            unknown: DiseaseInfo::unknown(),
        }
    }

    /// Guidance for `label`, or the placeholder when it is not in the catalog
    pub fn lookup(&self, label: &str) -> &DiseaseInfo {
        self.entries.get(label).unwrap_or(&self.unknown)
    }

    /// Whether `label` has a dedicated entry
    pub fn contains(&self, label: &str) -> bool {
        self.entries.contains_key(label)
    }

    /// Labels without an entry; empty for the builtin catalog
    pub fn missing_labels(&self) -> Vec<&'static str> {
        CLASS_NAMES
            .iter()
            .copied()
            .filter(|label| !self.contains(label))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
