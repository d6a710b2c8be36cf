//! Fixed label schema for the HAM10000 lesion categories.
//!
//! Every component that touches class indices (manifest loader, model head,
//! metrics, inference) goes through [`LesionClass`] so the index ↔ code
//! correspondence is defined in exactly one place.

use serde::{Deserialize, Serialize};

/// Number of lesion categories.
pub const NUM_CLASSES: usize = 7;

/// The seven HAM10000 diagnostic categories, in manifest column order.
///
/// The discriminant of each variant is the model output index and the
/// one-hot column index in the ground-truth manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LesionClass {
    Mel = 0,
    Nv = 1,
    Bcc = 2,
    Akiec = 3,
    Bkl = 4,
    Df = 5,
    Vasc = 6,
}

impl LesionClass {
    /// All classes in index order.
    pub const ALL: [LesionClass; NUM_CLASSES] = [
        LesionClass::Mel,
        LesionClass::Nv,
        LesionClass::Bcc,
        LesionClass::Akiec,
        LesionClass::Bkl,
        LesionClass::Df,
        LesionClass::Vasc,
    ];

    /// Short diagnostic code as it appears in the manifest header.
    pub fn code(&self) -> &'static str {
        match self {
            LesionClass::Mel => "MEL",
            LesionClass::Nv => "NV",
            LesionClass::Bcc => "BCC",
            LesionClass::Akiec => "AKIEC",
            LesionClass::Bkl => "BKL",
            LesionClass::Df => "DF",
            LesionClass::Vasc => "VASC",
        }
    }

    /// Human-readable name of the diagnosis.
    pub fn display_name(&self) -> &'static str {
        match self {
            LesionClass::Mel => "Melanoma",
            LesionClass::Nv => "Melanocytic Nevus",
            LesionClass::Bcc => "Basal Cell Carcinoma",
            LesionClass::Akiec => "Actinic Keratosis / Intraepithelial Carcinoma",
            LesionClass::Bkl => "Benign Keratosis",
            LesionClass::Df => "Dermatofibroma",
            LesionClass::Vasc => "Vascular Lesion",
        }
    }

    /// One-sentence clinical description shown next to a prediction.
    pub fn description(&self) -> &'static str {
        match self {
            LesionClass::Mel => {
                "A serious form of skin cancer that develops in the cells (melanocytes) \
                 that produce melanin."
            }
            LesionClass::Nv => {
                "A common, usually non-cancerous growth on the skin that develops when \
                 pigment cells (melanocytes) grow in clusters or clumps."
            }
            LesionClass::Bcc => {
                "A type of skin cancer that begins in the basal cells, usually caused by \
                 long-term exposure to ultraviolet (UV) radiation."
            }
            LesionClass::Akiec => {
                "A precancerous skin growth that can develop into squamous cell carcinoma \
                 if left untreated."
            }
            LesionClass::Bkl => {
                "A non-cancerous skin growth that develops from keratinocytes, often \
                 appearing as a waxy, scaly, or rough growth on the skin."
            }
            LesionClass::Df => {
                "A common, benign skin growth that often appears as a small, firm bump on \
                 the skin, usually on the legs."
            }
            LesionClass::Vasc => {
                "A general term for visible abnormalities of blood vessels on the skin, \
                 including hemangiomas and port-wine stains."
            }
        }
    }

    /// Model output index of this class.
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Class for a model output index.
    pub fn from_index(index: usize) -> Option<LesionClass> {
        Self::ALL.get(index).copied()
    }

    /// Class for a manifest column code.
    pub fn from_code(code: &str) -> Option<LesionClass> {
        Self::ALL.iter().find(|c| c.code() == code).copied()
    }
}

impl std::fmt::Display for LesionClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}
