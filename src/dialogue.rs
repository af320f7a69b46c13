//! The five-step questionnaire. Each step validates one free-text answer, stores it
//! and prompts for the next value; the final step hands the collected figures to the
//! fitter. Locale-specific parsing (comma decimals, `;`-separated lists) lives here,
//! never in the fitter.

use serde::{Deserialize, Serialize};

use crate::fit::{fit, FitRequest};
use crate::lang::Language;

/// Step number of the first question; steps run 1 through 5, 0 means "no dialogue".
pub const FIRST_STEP: u8 = 1;

/// Upper bound on wraps a user may request.
const MAX_WRAPS: u32 = 10;

/// Upper bound on beads in the repeating unit.
const MAX_PATTERN_BEADS: usize = 20;

/// Values accumulated across the dialogue, persisted between webhook calls.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DialogueData {
    pub wrist_cm: Option<f64>,
    pub wraps: Option<u32>,
    pub pattern: Option<Vec<f64>>,
    pub magnet_mm: Option<f64>,
    pub tolerance_mm: Option<f64>,
}

/// Result of feeding one user answer into the state machine.
#[derive(Clone, Debug, PartialEq)]
pub struct StepOutcome {
    /// Step to persist; 0 ends the dialogue.
    pub next: u8,
    /// Reply to send back to the user.
    pub reply: String,
    /// Accumulated data after this step.
    pub data: DialogueData,
    /// True only when the fitter produced a result on the final step.
    pub completed: bool,
}

/// Prompt sent in response to `/start`, before any answer arrives.
pub fn start_prompt(lang: Language) -> &'static str {
    choose(
        lang,
        "Шаг 1 из 5. Введи обхват запястья в сантиметрах.",
        "Step 1 of 5. Enter wrist circumference in centimeters.",
    )
}

/// Reply when a dialogue has not been started (or its state was lost).
pub fn restart_prompt(lang: Language) -> &'static str {
    choose(lang, "Отправь /start, чтобы начать.", "Send /start to begin.")
}

/// Reply when the update carries no text to parse.
pub fn text_required(lang: Language) -> &'static str {
    choose(
        lang,
        "Пожалуйста, введи значение текстом.",
        "Please send a text value.",
    )
}

/// Reply when a storage or delivery fault prevents processing.
pub fn server_error(lang: Language) -> &'static str {
    choose(
        lang,
        "Ошибка сервера. Попробуй позже.",
        "Server error. Try again later.",
    )
}

/// Advances the dialogue by one answer. Invalid input re-prompts the same step;
/// an unrecognised step resets the dialogue.
pub fn process_step(step: u8, input: &str, data: DialogueData, lang: Language) -> StepOutcome {
    let input = input.trim();
    match step {
        1 => match parse_decimal(input) {
            Some(wrist_cm) => advance(
                2,
                choose(lang, "Сколько будет витков?", "How many wraps will the bracelet have?"),
                DialogueData {
                    wrist_cm: Some(wrist_cm),
                    ..data
                },
            ),
            None => retry(
                step,
                choose(
                    lang,
                    "Некорректный обхват. Введи число в сантиметрах.",
                    "Invalid value. Enter wrist circumference in centimeters.",
                ),
                data,
            ),
        },
        2 => match parse_wraps(input) {
            Some(wraps) => advance(
                3,
                choose(
                    lang,
                    "Введи узор: размеры бусин в мм через точку с запятой (например 10;8).",
                    "Enter bead pattern in millimeters separated by semicolons (e.g., 10;8).",
                ),
                DialogueData {
                    wraps: Some(wraps),
                    ..data
                },
            ),
            None => retry(
                step,
                choose(
                    lang,
                    "Некорректное число витков. Введи положительное целое число не больше 10.",
                    "Invalid wraps count. Enter a positive integer not greater than 10.",
                ),
                data,
            ),
        },
        3 => match parse_pattern(input) {
            Some(pattern) => advance(
                4,
                choose(lang, "Укажи размер магнита в миллиметрах.", "Enter magnet size in millimeters."),
                DialogueData {
                    pattern: Some(pattern),
                    ..data
                },
            ),
            None => retry(
                step,
                choose(lang, "Некорректный узор.", "Invalid pattern."),
                data,
            ),
        },
        4 => match parse_decimal(input) {
            Some(magnet_mm) => advance(
                5,
                choose(
                    lang,
                    "Введи допуск по длине в миллиметрах.",
                    "Enter allowable length tolerance in millimeters.",
                ),
                DialogueData {
                    magnet_mm: Some(magnet_mm),
                    ..data
                },
            ),
            None => retry(
                step,
                choose(lang, "Некорректный размер магнита.", "Invalid magnet size."),
                data,
            ),
        },
        5 => match parse_decimal(input) {
            Some(tolerance_mm) => {
                let data = DialogueData {
                    tolerance_mm: Some(tolerance_mm),
                    ..data
                };
                complete(data, lang)
            }
            None => retry(
                step,
                choose(lang, "Некорректный допуск.", "Invalid tolerance."),
                data,
            ),
        },
        // Any other step means the state was lost.
        _ => StepOutcome {
            next: 0,
            reply: restart_prompt(lang).into(),
            data: DialogueData::default(),
            completed: false,
        },
    }
}

fn complete(data: DialogueData, lang: Language) -> StepOutcome {
    let (Some(wrist_cm), Some(wraps), Some(pattern), Some(magnet_mm), Some(tolerance_mm)) = (
        data.wrist_cm,
        data.wraps,
        data.pattern.clone(),
        data.magnet_mm,
        data.tolerance_mm,
    ) else {
        // Earlier answers went missing; the dialogue cannot be completed.
        return StepOutcome {
            next: 0,
            reply: restart_prompt(lang).into(),
            data: DialogueData::default(),
            completed: false,
        };
    };
    let request = FitRequest {
        wrist_cm,
        wraps,
        pattern,
        magnet_mm,
        tolerance_mm,
        language: lang,
    };
    match fit(&request) {
        Ok(outcome) => StepOutcome {
            next: 0,
            reply: outcome.text,
            data,
            completed: true,
        },
        // The fitter's messages are already localized and user-facing.
        Err(err) => StepOutcome {
            next: 0,
            reply: err.to_string(),
            data,
            completed: false,
        },
    }
}

fn advance(next: u8, reply: &str, data: DialogueData) -> StepOutcome {
    StepOutcome {
        next,
        reply: reply.into(),
        data,
        completed: false,
    }
}

fn retry(step: u8, reply: &str, data: DialogueData) -> StepOutcome {
    StepOutcome {
        next: step,
        reply: reply.into(),
        data,
        completed: false,
    }
}

fn choose(lang: Language, ru: &'static str, en: &'static str) -> &'static str {
    match lang {
        Language::Ru => ru,
        Language::En => en,
    }
}

/// Parses a positive decimal below 100, accepting a comma as the decimal separator.
pub fn parse_decimal(input: &str) -> Option<f64> {
    let value: f64 = input.trim().replace(',', ".").parse().ok()?;
    (value > 0.0 && value < 100.0).then_some(value)
}

/// Parses a wrap count: digits only, 1 through 10.
pub fn parse_wraps(input: &str) -> Option<u32> {
    let input = input.trim();
    if input.is_empty() || !input.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value: u32 = input.parse().ok()?;
    (1..=MAX_WRAPS).contains(&value).then_some(value)
}

/// Parses a `;`-separated list of bead diameters. Spaces are ignored, comma decimals
/// accepted, empty fragments dropped; at most [`MAX_PATTERN_BEADS`] entries, each in
/// (0, 100).
pub fn parse_pattern(input: &str) -> Option<Vec<f64>> {
    let normalized = input.replace(' ', "").replace(',', ".");
    let fragments: Vec<_> = normalized.split(';').filter(|f| !f.is_empty()).collect();
    if fragments.is_empty() || fragments.len() > MAX_PATTERN_BEADS {
        return None;
    }
    let mut pattern = Vec::with_capacity(fragments.len());
    for fragment in fragments {
        let value: f64 = fragment.parse().ok()?;
        if value <= 0.0 || value >= 100.0 {
            return None;
        }
        pattern.push(value);
    }
    Some(pattern)
}
