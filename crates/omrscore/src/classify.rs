//! Bubble fill measurement and per-question mark decisions.
//!
//! Fill ratios are normalized against the local paper brightness around each
//! bubble, so uneven lighting across the sheet does not shift them. The
//! fill threshold adapts per sheet when the ratios separate into a clear
//! empty and filled population.

use image::GrayImage;

use crate::grid::BubbleRegion;
use crate::layout::LayoutConfig;

/// How to resolve a question with two or more filled bubbles.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MultiMarkPolicy {
    /// Any second filled bubble makes the question `Multiple`.
    Strict,
    /// The darkest bubble wins when it exceeds the runner-up by `separation_margin`.
    DominantWins { separation_margin: f32 },
}

impl Default for MultiMarkPolicy {
    fn default() -> Self {
        Self::DominantWins {
            separation_margin: 0.25,
        }
    }
}

/// Handling of bubbles whose region could not be confirmed on the sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LowConfidencePolicy {
    /// Measure normally; the question is flagged in the result.
    #[default]
    Classify,
    /// Never count the bubble as filled; its ratio is still reported.
    TreatAsEmpty,
}

/// Configuration for the classification stage.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ClassifyConfig {
    /// Measured disc radius relative to the bubble radius (excludes the printed outline).
    pub mask_radius_ratio: f32,
    /// Background window half-size relative to the bubble radius.
    pub background_window_ratio: f32,
    /// Quantile of the window taken as local paper brightness.
    pub background_percentile: f32,
    /// A mask pixel is dark below `dark_ratio * background`.
    pub dark_ratio: f32,
    /// Fill ratio above which a bubble is filled (fallback when adaptation fails).
    pub fill_threshold: f32,
    pub adaptive_threshold: bool,
    /// Admissible range for the adaptive threshold.
    pub adaptive_range: [f32; 2],
    /// Minimum gap between the empty and filled populations to adapt.
    pub min_adaptive_gap: f32,
    pub multi_mark: MultiMarkPolicy,
    pub low_confidence: LowConfidencePolicy,
}

impl Default for ClassifyConfig {
    fn default() -> Self {
        Self {
            mask_radius_ratio: 0.7,
            background_window_ratio: 2.0,
            background_percentile: 0.9,
            dark_ratio: 0.65,
            fill_threshold: 0.45,
            adaptive_threshold: true,
            adaptive_range: [0.25, 0.75],
            min_adaptive_gap: 0.2,
            multi_mark: MultiMarkPolicy::default(),
            low_confidence: LowConfidencePolicy::default(),
        }
    }
}

impl ClassifyConfig {
    pub(crate) fn validate(&self) -> Result<(), String> {
        let in_unit = |name: &str, v: f32| -> Result<(), String> {
            if !(0.0..=1.0).contains(&v) {
                return Err(format!("classify.{name} must be in [0, 1]"));
            }
            Ok(())
        };
        if !(self.mask_radius_ratio > 0.0 && self.mask_radius_ratio <= 1.0) {
            return Err("classify.mask_radius_ratio must be in (0, 1]".to_string());
        }
        if !(self.background_window_ratio >= 1.0 && self.background_window_ratio.is_finite()) {
            return Err("classify.background_window_ratio must be finite and >= 1".to_string());
        }
        in_unit("background_percentile", self.background_percentile)?;
        in_unit("dark_ratio", self.dark_ratio)?;
        in_unit("fill_threshold", self.fill_threshold)?;
        in_unit("min_adaptive_gap", self.min_adaptive_gap)?;
        let [lo, hi] = self.adaptive_range;
        in_unit("adaptive_range", lo)?;
        in_unit("adaptive_range", hi)?;
        if lo > hi {
            return Err("classify.adaptive_range must be ordered [low, high]".to_string());
        }
        if let MultiMarkPolicy::DominantWins { separation_margin } = self.multi_mark {
            if !(separation_margin > 0.0 && separation_margin <= 1.0) {
                return Err("classify.multi_mark.separation_margin must be in (0, 1]".to_string());
            }
        }
        Ok(())
    }
}

/// Interpreted mark of one question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", content = "option", rename_all = "snake_case")]
pub enum Mark {
    Selected(usize),
    Blank,
    Multiple,
}

/// Measured fill of one bubble.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct BubbleReading {
    pub question: usize,
    pub option: usize,
    /// Dark fraction of the measured disc, in [0, 1].
    pub fill_ratio: f32,
    pub low_confidence: bool,
}

/// Decision for one question.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct QuestionAnswer {
    pub question: usize,
    pub mark: Mark,
    /// Options whose fill ratio exceeds the sheet threshold, ascending.
    pub filled: Vec<usize>,
    /// At least one of the question's regions is low-confidence.
    pub low_confidence: bool,
}

/// Classifier output for one sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// One answer per question, ascending.
    pub answers: Vec<QuestionAnswer>,
    /// One reading per region, in region order.
    pub readings: Vec<BubbleReading>,
    /// Fill threshold applied to this sheet.
    pub threshold: f32,
}

/// Fraction of the bubble's inner disc that is clearly darker than the local paper.
pub fn fill_ratio(gray: &GrayImage, region: &BubbleRegion, config: &ClassifyConfig) -> f32 {
    let (w, h) = gray.dimensions();
    if w == 0 || h == 0 {
        return 0.0;
    }
    let [cx, cy] = region.center;
    let half = config.background_window_ratio * region.radius;
    let x0 = (cx - half).floor().max(0.0) as u32;
    let y0 = (cy - half).floor().max(0.0) as u32;
    let x1 = ((cx + half).ceil().max(0.0) as u32).min(w - 1);
    let y1 = ((cy + half).ceil().max(0.0) as u32).min(h - 1);
    if x0 > x1 || y0 > y1 {
        return 0.0;
    }

    let mut window: Vec<u8> = Vec::with_capacity(((x1 - x0 + 1) * (y1 - y0 + 1)) as usize);
    for y in y0..=y1 {
        for x in x0..=x1 {
            window.push(gray.get_pixel(x, y)[0]);
        }
    }
    let background = quantile_u8(&mut window, config.background_percentile) as f32;
    let dark_below = config.dark_ratio * background;

    let rm = config.mask_radius_ratio * region.radius;
    let rm2 = rm * rm;
    let mut total = 0u32;
    let mut dark = 0u32;
    for y in y0..=y1 {
        for x in x0..=x1 {
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;
            if dx * dx + dy * dy > rm2 {
                continue;
            }
            total += 1;
            if (gray.get_pixel(x, y)[0] as f32) < dark_below {
                dark += 1;
            }
        }
    }
    if total == 0 {
        return 0.0;
    }
    dark as f32 / total as f32
}

fn quantile_u8(values: &mut [u8], q: f32) -> u8 {
    if values.is_empty() {
        return 0;
    }
    let idx = ((values.len() - 1) as f32 * q.clamp(0.0, 1.0)).round() as usize;
    let (_, v, _) = values.select_nth_unstable(idx);
    *v
}

/// Threshold separating empty and filled bubbles on one sheet.
///
/// Uses the midpoint of the widest gap between consecutive sorted ratios that
/// lies inside `adaptive_range`; falls back to `fill_threshold` when that gap
/// is narrower than `min_adaptive_gap`.
pub fn sheet_fill_threshold(ratios: &[f32], config: &ClassifyConfig) -> f32 {
    if !config.adaptive_threshold || ratios.len() < 2 {
        return config.fill_threshold;
    }
    let mut sorted = ratios.to_vec();
    sorted.sort_by(f32::total_cmp);

    let [lo, hi] = config.adaptive_range;
    let mut best: Option<(f32, f32)> = None;
    for pair in sorted.windows(2) {
        let gap = pair[1] - pair[0];
        let mid = 0.5 * (pair[0] + pair[1]);
        if mid < lo || mid > hi {
            continue;
        }
        if best.map_or(true, |(g, _)| gap > g) {
            best = Some((gap, mid));
        }
    }

    match best {
        Some((gap, mid)) if gap >= config.min_adaptive_gap => mid,
        _ => config.fill_threshold,
    }
}

fn counts_as_mark(reading: &BubbleReading, config: &ClassifyConfig) -> bool {
    !(reading.low_confidence && config.low_confidence == LowConfidencePolicy::TreatAsEmpty)
}

/// Decide the mark of one question from its readings (one per option, ascending).
pub fn decide(
    question: usize,
    readings: &[BubbleReading],
    threshold: f32,
    config: &ClassifyConfig,
) -> QuestionAnswer {
    let filled: Vec<&BubbleReading> = readings
        .iter()
        .filter(|r| counts_as_mark(r, config) && r.fill_ratio > threshold)
        .collect();

    let mark = match filled.as_slice() {
        [] => Mark::Blank,
        [only] => Mark::Selected(only.option),
        many => match config.multi_mark {
            MultiMarkPolicy::Strict => Mark::Multiple,
            MultiMarkPolicy::DominantWins { separation_margin } => {
                let mut ranked: Vec<&BubbleReading> = many.to_vec();
                ranked.sort_by(|a, b| {
                    b.fill_ratio
                        .total_cmp(&a.fill_ratio)
                        .then(a.option.cmp(&b.option))
                });
                if ranked[0].fill_ratio - ranked[1].fill_ratio >= separation_margin {
                    Mark::Selected(ranked[0].option)
                } else {
                    Mark::Multiple
                }
            }
        },
    };

    QuestionAnswer {
        question,
        mark,
        filled: filled.iter().map(|r| r.option).collect(),
        low_confidence: readings.iter().any(|r| r.low_confidence),
    }
}

/// Measure every region and decide every question of the sheet.
///
/// `regions` must be question-major with `options_per_question` entries per question.
pub fn classify_sheet(
    gray: &GrayImage,
    regions: &[BubbleRegion],
    layout: &LayoutConfig,
    config: &ClassifyConfig,
) -> Classification {
    let readings: Vec<BubbleReading> = regions
        .iter()
        .map(|r| BubbleReading {
            question: r.question,
            option: r.option,
            fill_ratio: fill_ratio(gray, r, config),
            low_confidence: r.low_confidence,
        })
        .collect();

    let considered: Vec<f32> = readings
        .iter()
        .filter(|r| counts_as_mark(r, config))
        .map(|r| r.fill_ratio)
        .collect();
    let threshold = sheet_fill_threshold(&considered, config);

    let k = layout.options_per_question.max(1);
    let answers: Vec<QuestionAnswer> = readings
        .chunks(k)
        .map(|chunk| decide(chunk[0].question, chunk, threshold, config))
        .collect();

    let selected = answers.iter().filter(|a| matches!(a.mark, Mark::Selected(_))).count();
    let multiple = answers.iter().filter(|a| a.mark == Mark::Multiple).count();
    tracing::info!(
        "Classified {} questions: {} selected, {} blank, {} multiple (threshold {:.3})",
        answers.len(),
        selected,
        answers.len() - selected - multiple,
        multiple,
        threshold
    );

    Classification {
        answers,
        readings,
        threshold,
    }
}
