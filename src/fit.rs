//! The bead-sequence length fitter. Given a target bracelet length, a repeating
//! pattern of bead diameters and a clasp size, produces a sequence of beads whose
//! total length lands within a fixed band of the target, using deterministic
//! rounding and a bounded correction loop.

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::lang::Language;

/// Half-width of the acceptance band: the realized length may deviate from the
/// target by at most this many millimetres.
pub const LENGTH_BAND_MM: f64 = 2.0;

/// Upper bound on correction rounds before the fit is abandoned.
pub const MAX_CORRECTIONS: usize = 10;

/// A bead this close to the clasp size visually duplicates the clasp.
const CLASP_TRIM_BAND_MM: f64 = 0.5;

/// Physical parameters of one bracelet computation. Constructed once per completed
/// dialogue (or per CLI invocation) and consumed by a single [`fit`] call.
#[derive(Clone, Debug, PartialEq)]
pub struct FitRequest {
    /// Wrist circumference in centimetres.
    pub wrist_cm: f64,
    /// Number of loops of the strand around the wrist.
    pub wraps: u32,
    /// Repeating unit of bead diameters in millimetres.
    pub pattern: Vec<f64>,
    /// Length of the magnetic clasp in millimetres.
    pub magnet_mm: f64,
    /// Requested slack added to the target length, in millimetres.
    pub tolerance_mm: f64,
    /// Language of the rendered description and of any error message.
    pub language: Language,
}

/// Count of beads sharing one diameter, grouped on a 2-decimal-place identity.
#[derive(Clone, Debug, PartialEq)]
pub struct BeadCount {
    pub diameter_mm: f64,
    pub count: usize,
}

/// A successful fit: the user-facing description plus the figures behind it.
#[derive(Clone, Debug, PartialEq)]
pub struct FitOutcome {
    /// Rendered description in the request language.
    pub text: String,
    /// Distinct diameters present, sorted descending, each with a positive count.
    pub counts: Vec<BeadCount>,
    /// Target length: `wraps × wrist + tolerance`, in millimetres.
    pub target_mm: f64,
    /// Realized length: bead total plus clasp, in millimetres.
    pub realized_mm: f64,
    /// Correction rounds taken by the bounded loop.
    pub corrections: usize,
}

/// Failure modes of the fitter. The messages are user-facing, localized to the
/// request language; callers display them rather than retry.
#[derive(Debug, Error, PartialEq)]
pub enum FitError {
    /// Malformed or out-of-domain parameters. Always the caller's fault.
    #[error("{0}")]
    InvalidInput(String),
    /// The correction loop exhausted its budget without reaching the band. The
    /// chosen pattern is numerically incompatible with the requested tolerance.
    #[error("{0}")]
    NotConverged(String),
}

/// Fits a bead sequence to the requested bracelet and renders its description.
///
/// The sequence is a cyclic walk over the pattern; the initial bead count is
/// estimated from the pattern's mean diameter, trimmed of at most one bead that
/// visually duplicates the clasp, then corrected towards the target in at most
/// [`MAX_CORRECTIONS`] rounds. An out-of-band result is never returned: if the
/// loop fails to land within ±[`LENGTH_BAND_MM`], the call fails with
/// [`FitError::NotConverged`].
///
/// Pure function of its inputs: no I/O, no shared state, safe to call from any
/// number of tasks concurrently.
pub fn fit(req: &FitRequest) -> Result<FitOutcome, FitError> {
    let lang = req.language;
    if req.wraps == 0 {
        return Err(invalid_input(
            lang,
            "Количество витков должно быть больше нуля",
            "Wrap count must be greater than zero",
        ));
    }
    if req.pattern.is_empty() {
        return Err(invalid_input(
            lang,
            "Паттерн должен содержать хотя бы один размер бусины",
            "The pattern must contain at least one bead size",
        ));
    }
    if req.pattern.iter().any(|&d| d <= 0.0) {
        return Err(invalid_input(
            lang,
            "Диаметр бусины должен быть больше нуля",
            "Every bead diameter must be greater than zero",
        ));
    }

    let wrist_mm = req.wrist_cm * 10.0;
    let target = req.wraps as f64 * wrist_mm + req.tolerance_mm;
    if target <= req.magnet_mm {
        return Err(invalid_input(
            lang,
            "Общая длина браслета должна превышать размер магнита",
            "The total bracelet length must exceed the magnet size",
        ));
    }

    let avg = req.pattern.iter().sum::<f64>() / req.pattern.len() as f64;

    // f64::round breaks ties away from zero, fixing the estimate across platforms.
    let rough = ((target - req.magnet_mm) / avg).round() as usize;
    if rough == 0 {
        return Err(invalid_input(
            lang,
            "Невозможно подобрать набор бусин с указанными параметрами",
            "Cannot select a bead set for the given parameters",
        ));
    }

    let unit = req.pattern.len();
    let mut beads: Vec<f64> = (0..rough).map(|i| req.pattern[i % unit]).collect();
    let mut cursor = rough % unit;

    // Clasp-adjacency trim: at most one bead comes off, closest-to-end match wins.
    // The cursor is left where the materialization put it.
    if let Some(at) = beads
        .iter()
        .rposition(|&d| (d - req.magnet_mm).abs() < CLASP_TRIM_BAND_MM)
    {
        beads.remove(at);
    }

    let realized = |beads: &[f64]| beads.iter().sum::<f64>() + req.magnet_mm;
    let mut current = realized(&beads);
    let mut delta = target - current;
    let mut corrections = 0;
    while corrections < MAX_CORRECTIONS && delta.abs() > LENGTH_BAND_MM {
        if delta < -LENGTH_BAND_MM {
            // Too long: shed enough tail beads to re-enter the band, walking the
            // cursor backward. Ceiling guarantees enough are removed.
            let surplus = current - (target + LENGTH_BAND_MM);
            let remove = ((surplus / avg).ceil() as usize).min(beads.len());
            for _ in 0..remove {
                beads.pop();
                cursor = (cursor + unit - 1) % unit;
            }
        } else {
            // Too short: continue the pattern walk from the cursor.
            let shortfall = target - LENGTH_BAND_MM - current;
            let add = (shortfall / avg).ceil() as usize;
            for _ in 0..add {
                beads.push(req.pattern[cursor]);
                cursor = (cursor + 1) % unit;
            }
        }
        current = realized(&beads);
        delta = target - current;
        corrections += 1;
    }
    if delta.abs() > LENGTH_BAND_MM {
        return Err(not_converged(lang));
    }

    // Group on centi-millimetres so float noise cannot fragment the tally.
    let mut tally: FxHashMap<i64, usize> = FxHashMap::default();
    for &d in &beads {
        *tally.entry((d * 100.0).round() as i64).or_insert(0) += 1;
    }
    let mut grouped: Vec<_> = tally.into_iter().collect();
    grouped.sort_unstable_by(|a, b| b.0.cmp(&a.0));

    let counts: Vec<_> = grouped
        .iter()
        .map(|&(centi, count)| BeadCount {
            diameter_mm: centi as f64 / 100.0,
            count,
        })
        .collect();
    let text = render(req, &counts);
    Ok(FitOutcome {
        text,
        counts,
        target_mm: target,
        realized_mm: current,
        corrections,
    })
}

fn render(req: &FitRequest, counts: &[BeadCount]) -> String {
    let (word, unit, conjunction) = match req.language {
        Language::Ru => ("бусин", "мм", " и "),
        Language::En => ("beads", "mm", " and "),
    };
    let parts = counts
        .iter()
        .map(|bead| format!("{} {word} Ø{} {unit}", bead.count, bead.diameter_mm))
        .collect::<Vec<_>>()
        .join(conjunction);
    match req.language {
        Language::Ru => format!(
            "Обхват {} см → {parts} + {} мм допуск + {} мм крепление",
            req.wrist_cm, req.tolerance_mm, req.magnet_mm
        ),
        Language::En => format!(
            "Wrist {} cm → {parts} + {} mm slack + {} mm clasp",
            req.wrist_cm, req.tolerance_mm, req.magnet_mm
        ),
    }
}

fn invalid_input(lang: Language, ru: &str, en: &str) -> FitError {
    FitError::InvalidInput(
        match lang {
            Language::Ru => ru,
            Language::En => en,
        }
        .into(),
    )
}

fn not_converged(lang: Language) -> FitError {
    FitError::NotConverged(
        match lang {
            Language::Ru => "Не удалось подобрать длину браслета в пределах допуска",
            Language::En => "Could not fit the bracelet length within the tolerance",
        }
        .into(),
    )
}
