//! Class labels for the tomato leaf classifier
//!
//! The model's output vector is indexed in this order. Labels follow the
//! PlantVillage "Plant___Disease" convention.

/// Number of classes the classifier predicts
pub const NUM_CLASSES: usize = 10;

/// Prefix shared by every label, stripped for display
pub const LABEL_PREFIX: &str = "Tomato___";

/// Class names in model output order
pub const CLASS_NAMES: [&str; NUM_CLASSES] = [
    "Tomato___Bacterial_spot",                // 0
    "Tomato___Early_blight",                  // 1
    "Tomato___Late_blight",                   // 2
    "Tomato___Leaf_Mold",                     // 3
    "Tomato___Septoria_leaf_spot",            // 4
    "Tomato___Spider_mites",                  // 5
    "Tomato___Target_Spot",                   // 6
    "Tomato___Tomato_Yellow_Leaf_Curl_Virus", // 7
    "Tomato___Tomato_mosaic_virus",           // 8
    "Tomato___healthy",                       // 9
];

/// Get the class name for a given label index
pub fn class_name(label: usize) -> Option<&'static str> {
    CLASS_NAMES.get(label).copied()
}

/// Get the label index for a given class name
pub fn class_index(name: &str) -> Option<usize> {
    CLASS_NAMES.iter().position(|&n| n == name)
}

/// Check if a class represents a healthy plant (not diseased)
pub fn is_healthy_class(label: usize) -> bool {
    CLASS_NAMES
        .get(label)
        .map(|name| name.ends_with("healthy"))
        .unwrap_or(false)
}

/// Human-readable disease name: prefix removed, underscores become spaces
///
/// `Tomato___Leaf_Mold` becomes `Leaf Mold`.
pub fn display_name(label: &str) -> String {
    label.replace(LABEL_PREFIX, "").replace('_', " ")
}
