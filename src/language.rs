//! Detección de idioma y enrutado de traducciones a través del idioma pivote.
//!
//! Toda la recuperación y la generación trabajan en inglés (pivote). Los
//! mensajes entrantes en otro idioma se traducen al pivote y las respuestas se
//! traducen al idioma de visualización. Un fallo de traducción nunca rompe el
//! chat: se devuelve el texto original marcado como degradado.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::translation::TranslationProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    #[serde(rename = "en")]
    English,
    #[serde(rename = "hi")]
    Hindi,
    #[serde(rename = "ta")]
    Tamil,
    #[serde(rename = "te")]
    Telugu,
    #[serde(rename = "bn")]
    Bengali,
    #[serde(rename = "mr")]
    Marathi,
}

impl Language {
    pub const PIVOT: Language = Language::English;

    pub const ALL: [Language; 6] = [
        Language::English,
        Language::Hindi,
        Language::Tamil,
        Language::Telugu,
        Language::Bengali,
        Language::Marathi,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Language::English => "en",
            Language::Hindi => "hi",
            Language::Tamil => "ta",
            Language::Telugu => "te",
            Language::Bengali => "bn",
            Language::Marathi => "mr",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Language::English => "English",
            Language::Hindi => "Hindi",
            Language::Tamil => "Tamil",
            Language::Telugu => "Telugu",
            Language::Bengali => "Bengali",
            Language::Marathi => "Marathi",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        let code = code.trim().to_lowercase();
        Self::ALL.into_iter().find(|lang| lang.code() == code)
    }

    /// Igual que `from_code`, pero los códigos no soportados caen al pivote.
    pub fn resolve(code: Option<&str>) -> Self {
        code.and_then(Self::from_code).unwrap_or(Self::PIVOT)
    }

    pub fn is_pivot(self) -> bool {
        self == Self::PIVOT
    }

    pub fn thinking_text(self) -> &'static str {
        match self {
            Language::English => "Thinking...",
            Language::Hindi => "सोच रहा हूँ...",
            Language::Tamil => "சிந்திக்கிறேன்...",
            Language::Telugu => "ఆలోచిస్తున్నాను...",
            Language::Bengali => "ভাবছি...",
            Language::Marathi => "विचार करत आहे...",
        }
    }

    pub fn follow_up_chips(self) -> &'static [&'static str] {
        match self {
            Language::English => &[
                "Show my recent expenses",
                "Analyze spending trends",
                "Find budget insights",
                "Generate shopping list",
                "Check expiring items",
            ],
            Language::Hindi => &[
                "मेरे हाल के खर्च दिखाएं",
                "खर्च के रुझान का विश्लेषण करें",
                "बजट की अंतर्दृष्टि खोजें",
                "खरीदारी की सूची बनाएं",
                "समाप्त होने वाली वस्तुओं की जांच करें",
            ],
            Language::Tamil => &[
                "எனது சமீபத்திய செலவுகளைக் காட்டு",
                "செலவு போக்குகளை பகுப்பாய்வு செய்",
                "பட்ஜெட் நுண்ணறிவுகளைக் கண்டறி",
                "கடைப்பிடிப்பு பட்டியலை உருவாக்கு",
                "காலாவதியாகும் பொருட்களை சரிபார்",
            ],
            Language::Telugu => &[
                "నా ఇటీవలి ఖర్చులను చూపించు",
                "ఖర్చు ధోరణులను విశ్లేషించు",
                "బడ్జెట్ అంతర్దృష్టులను కనుగొను",
                "షాపింగ్ జాబితాను సృష్టించు",
                "గడువు ముగియని వస్తువులను తనిఖీ చేయు",
            ],
            Language::Bengali => &[
                "আমার সাম্প্রতিক খরচ দেখাও",
                "খরচের প্রবণতা বিশ্লেষণ করো",
                "বাজেটের অন্তর্দৃষ্টি খুঁজে বের করো",
                "কেনাকাটার তালিকা তৈরি করো",
                "মেয়াদোত্তীর্ণ আইটেমগুলি পরীক্ষা করো",
            ],
            Language::Marathi => &[
                "माझे अलीकडील खर्च दाखवा",
                "खर्चाच्या प्रवृत्तींचे विश्लेषण करा",
                "बजेट अंतर्दृष्टी शोधा",
                "खरेदीची यादी तयार करा",
                "कालबाह्य होणाऱ्या वस्तू तपासा",
            ],
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

// ---------------------------------------------------------------------
// DETECCIÓN
// ---------------------------------------------------------------------

/// Listas de frases por idioma, en orden de prioridad. El orden importa:
/// hindi y marathi comparten palabras y gana el primero.
const KEYWORDS: [(Language, &[&str]); 5] = [
    (
        Language::Hindi,
        &["नमस्ते", "कैसे", "हैं", "धन्यवाद", "कृपया", "अलविदा", "सुप्रभात", "शुभ रात्रि", "हाँ", "नहीं"],
    ),
    (
        Language::Tamil,
        &["வணக்கம்", "எப்படி", "உள்ளீர்கள்", "நன்றி", "தயவுசெய்து", "பிரியாவிடை", "காலை வணக்கம்", "இரவு வணக்கம்"],
    ),
    (
        Language::Telugu,
        &["నమస్కారం", "ఎలా", "ఉన్నారు", "ధన్యవాదాలు", "దయచేసి", "వీడ్కోలు", "శుభోదయం", "శుభ రాత్రి"],
    ),
    (
        Language::Bengali,
        &["নমস্কার", "কেমন", "আছেন", "ধন্যবাদ", "অনুগ্রহ করে", "বিদায়", "সুপ্রভাত", "শুভ রাত্রি"],
    ),
    (
        Language::Marathi,
        &["नमस्कार", "कसे", "आहात", "धन्यवाद", "कृपया", "निरोप", "सुप्रभात", "शुभ रात्री", "होय", "नाही"],
    ),
];

/// Bloques Unicode por escritura, en el orden fijo en que se evalúan.
const SCRIPTS: [(Language, char, char); 4] = [
    (Language::Hindi, '\u{0900}', '\u{097F}'),
    (Language::Tamil, '\u{0B80}', '\u{0BFF}'),
    (Language::Telugu, '\u{0C00}', '\u{0C7F}'),
    (Language::Bengali, '\u{0980}', '\u{09FF}'),
];

/// Porcentaje mínimo (estricto) de caracteres de una escritura.
const SCRIPT_THRESHOLD_PERCENT: usize = 30;

/// Detecta el idioma de `text`. Función pura: misma entrada, mismo código.
pub fn detect_language(text: &str) -> Language {
    let lowered = text.to_lowercase();
    for (language, phrases) in KEYWORDS {
        if phrases.iter().any(|phrase| lowered.contains(phrase)) {
            return language;
        }
    }

    let total = text.chars().count();
    for (language, start, end) in SCRIPTS {
        let in_script = text.chars().filter(|c| (start..=end).contains(c)).count();
        if in_script * 100 > total * SCRIPT_THRESHOLD_PERCENT {
            return language;
        }
    }

    Language::PIVOT
}

// ---------------------------------------------------------------------
// TRADUCCIÓN
// ---------------------------------------------------------------------

/// Resultado de una traducción. `degraded` indica que el proveedor falló y
/// `text` es el texto original.
#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    pub text: String,
    pub degraded: bool,
    pub translated: bool,
}

impl Translation {
    /// Texto que no necesitaba traducción.
    pub fn unchanged(text: &str) -> Self {
        Self {
            text: text.to_string(),
            degraded: false,
            translated: false,
        }
    }
}

#[derive(Clone)]
pub struct LanguagePipeline {
    translator: Arc<dyn TranslationProvider>,
    timeout: Duration,
}

impl LanguagePipeline {
    pub fn new(translator: Arc<dyn TranslationProvider>, timeout: Duration) -> Self {
        Self { translator, timeout }
    }

    /// Traduce hacia el idioma de visualización. No hace nada si el destino
    /// es el pivote o coincide con el origen.
    pub async fn translate(&self, text: &str, target: Language, source: Language) -> Translation {
        if target.is_pivot() || target == source {
            return Translation::unchanged(text);
        }
        self.call_provider(text, source, target).await
    }

    /// Tramo de entrada: lleva un mensaje al idioma pivote.
    pub async fn translate_to_pivot(&self, text: &str, source: Language) -> Translation {
        if source.is_pivot() {
            return Translation::unchanged(text);
        }
        self.call_provider(text, source, Language::PIVOT).await
    }

    async fn call_provider(&self, text: &str, source: Language, target: Language) -> Translation {
        if text.trim().is_empty() {
            return Translation::unchanged(text);
        }

        let result = tokio::time::timeout(
            self.timeout,
            self.translator.translate(text, source, target),
        )
        .await;

        match result {
            Ok(Ok(translated)) => {
                debug!("Traducción {source}→{target} completada.");
                Translation {
                    text: translated,
                    degraded: false,
                    translated: true,
                }
            }
            Ok(Err(e)) => {
                warn!("Traducción {source}→{target} degradada, se usa el texto original: {e}");
                Translation {
                    text: text.to_string(),
                    degraded: true,
                    translated: false,
                }
            }
            Err(_) => {
                warn!(
                    "Traducción {source}→{target} superó el timeout de {:?}, se usa el texto original.",
                    self.timeout
                );
                Translation {
                    text: text.to_string(),
                    degraded: true,
                    translated: false,
                }
            }
        }
    }
}
