//! End-to-end tests on synthetic photographed sheets.

use image::{DynamicImage, GrayImage, Luma};

use crate::align::AlignmentMode;
use crate::answer_key::AnswerKey;
use crate::api::{evaluate, evaluate_with_config, Evaluator};
use crate::classify::{Mark, MultiMarkPolicy};
use crate::config::EvaluateConfig;
use crate::error::EvaluateError;
use crate::layout::LayoutConfig;
use crate::report::EvaluationResult;
use crate::scoring::{MultipleMarkScoring, Verdict};
use crate::test_utils::{photograph, render_sheet, test_layout, PhotoParams, FIDUCIAL, PAPER};

/// Options chosen by the simulated student; `None` leaves the question blank.
const STUDENT: [Option<usize>; 12] = [
    Some(0),
    Some(1),
    Some(2),
    Some(3),
    Some(0),
    Some(1),
    Some(2),
    Some(3),
    Some(0),
    Some(1),
    None,
    None,
];

fn student_marks() -> Vec<(usize, usize)> {
    STUDENT
        .iter()
        .enumerate()
        .filter_map(|(q, o)| o.map(|o| (q, o)))
        .collect()
}

/// Matches the student except on question 2, where the key expects C.
fn key() -> AnswerKey {
    AnswerKey::from_options(&[0, 2, 2, 3, 0, 1, 2, 3, 0, 1, 0, 0])
}

fn photo(layout: &LayoutConfig, marks: &[(usize, usize)], params: &PhotoParams) -> DynamicImage {
    DynamicImage::ImageLuma8(photograph(&render_sheet(layout, marks, &[]), params))
}

fn tilted() -> PhotoParams {
    PhotoParams {
        angle_deg: 2.0,
        falloff: 0.2,
        noise: 4,
        ..PhotoParams::default()
    }
}

fn marks_of(result: &EvaluationResult) -> Vec<Mark> {
    result.questions.iter().map(|q| q.mark).collect()
}

fn expected_marks() -> Vec<Mark> {
    STUDENT
        .iter()
        .map(|o| o.map_or(Mark::Blank, Mark::Selected))
        .collect()
}

#[test]
fn fiducial_alignment_recovers_ground_truth() {
    let layout = test_layout();
    let image = photo(&layout, &student_marks(), &tilted());
    let result = evaluate(&image, &layout, &key()).expect("evaluated");

    assert_eq!(result.alignment.mode, AlignmentMode::Fiducials);
    assert_eq!(marks_of(&result), expected_marks());
    assert_eq!(result.score, 9.0);
    assert_eq!(result.max_score, 12.0);
    assert!((result.percentage - 75.0).abs() < 1e-9);
    assert_eq!(result.attempted, 10);
    assert_eq!(result.counts.correct, 9);
    assert_eq!(result.counts.blank, 2);
    assert_eq!(result.incorrect_questions(), vec![2]);
    assert_eq!(result.low_confidence_regions, 0);
    assert_eq!(result.layout_name, "quiz_12q");
}

#[test]
fn sheet_boundary_alignment_recovers_ground_truth() {
    let layout = LayoutConfig {
        fiducials: None,
        ..test_layout()
    };
    let image = photo(&layout, &student_marks(), &tilted());
    let result = evaluate(&image, &layout, &key()).expect("evaluated");

    assert_eq!(result.alignment.mode, AlignmentMode::SheetBoundary);
    assert_eq!(marks_of(&result), expected_marks());
    assert_eq!(result.score, 9.0);
    assert_eq!(result.questions[1].verdict, Verdict::Incorrect);
}

#[test]
fn explicit_boundary_mode_on_fiducial_sheet() {
    let layout = test_layout();
    let image = photo(&layout, &student_marks(), &PhotoParams::default());
    let mut config = EvaluateConfig::default();
    config.align.mode = AlignmentMode::SheetBoundary;
    let result = evaluate_with_config(&image, &layout, &key(), &config).expect("evaluated");
    assert_eq!(result.alignment.mode, AlignmentMode::SheetBoundary);
    assert_eq!(marks_of(&result), expected_marks());
}

#[test]
fn evaluation_is_idempotent() {
    let layout = test_layout();
    let image = photo(&layout, &student_marks(), &tilted());
    let evaluator = Evaluator::new(layout, key()).expect("valid inputs");
    let first = evaluator.evaluate(&image).expect("first run");
    let second = evaluator.evaluate(&image).expect("second run");
    assert_eq!(first, second);
}

#[test]
fn blank_sheet_scores_zero() {
    let layout = test_layout();
    let image = photo(&layout, &[], &tilted());
    let result = evaluate(&image, &layout, &key()).expect("evaluated");
    assert!(result.questions.iter().all(|q| q.verdict == Verdict::Blank));
    assert_eq!(result.score, 0.0);
    assert_eq!(result.attempted, 0);
    assert_eq!(result.counts.blank, 12);
}

#[test]
fn fully_correct_sheet_scores_every_weight() {
    let layout = test_layout();
    let answers = [0, 1, 2, 3, 3, 2, 1, 0, 0, 1, 2, 3];
    let marks: Vec<(usize, usize)> = answers.iter().copied().enumerate().collect();
    let image = photo(&layout, &marks, &tilted());

    let mut config = EvaluateConfig::default();
    config.scoring.default_weight = 2.0;
    let result =
        evaluate_with_config(&image, &layout, &AnswerKey::from_options(&answers), &config)
            .expect("evaluated");
    assert_eq!(result.score, 24.0);
    assert_eq!(result.percentage, 100.0);
    assert_eq!(result.counts.correct, 12);
}

#[test]
fn two_equally_dark_bubbles_are_multiple_marked() {
    let layout = test_layout();
    let mut marks = student_marks();
    marks.push((0, 2));
    let image = photo(&layout, &marks, &tilted());
    let result = evaluate(&image, &layout, &key()).expect("evaluated");

    let q1 = result.question(1).expect("question 1");
    assert_eq!(q1.mark, Mark::Multiple);
    assert_eq!(q1.verdict, Verdict::MultipleMarked);
    assert_eq!(q1.filled, vec!['A', 'C']);
    assert_eq!(q1.points, 0.0);
    assert_eq!(result.counts.multiple_marked, 1);
}

#[test]
fn rotated_and_scaled_photo_gives_same_answers() {
    let layout = test_layout();
    let straight = photo(&layout, &student_marks(), &PhotoParams::default());
    let rotated = photo(
        &layout,
        &student_marks(),
        &PhotoParams {
            angle_deg: -3.0,
            scale: 1.1,
            offset: [6.0, -4.0],
            ..PhotoParams::default()
        },
    );
    let evaluator = Evaluator::new(layout, key()).expect("valid inputs");
    let a = evaluator.evaluate(&straight).expect("straight");
    let b = evaluator.evaluate(&rotated).expect("rotated");
    assert_eq!(marks_of(&a), marks_of(&b));
    assert_eq!(a.score, b.score);
}

#[test]
fn incomplete_key_fails_before_image_processing() {
    let layout = test_layout();
    let key = AnswerKey::from_options(&[0; 11]);
    // A 1x1 image would fail the quality gate if it were ever inspected.
    let tiny = DynamicImage::ImageLuma8(GrayImage::new(1, 1));
    let err = evaluate(&tiny, &layout, &key).expect_err("key incomplete");
    assert_eq!(err.kind(), "config");
    assert!(err.to_string().contains("12"));
}

#[test]
fn sheet_without_bubbles_is_a_layout_mismatch() {
    let layout = test_layout();
    let mut sheet = GrayImage::from_pixel(300, 400, Luma([PAPER]));
    for [fx, fy] in layout.fiducial_centers().expect("fiducials") {
        for y in (fy - 15.0) as u32..=(fy + 15.0) as u32 {
            for x in (fx - 15.0) as u32..=(fx + 15.0) as u32 {
                sheet.put_pixel(x, y, Luma([FIDUCIAL]));
            }
        }
    }
    let image = DynamicImage::ImageLuma8(photograph(&sheet, &PhotoParams::default()));
    let err = evaluate(&image, &layout, &key()).expect_err("no printed bubbles");
    assert!(matches!(
        err,
        EvaluateError::LayoutMismatch { total: 48, .. }
    ));
}

#[test]
fn half_dark_image_fails_alignment() {
    let layout = test_layout();
    let gray = GrayImage::from_fn(400, 400, |x, _| if x < 200 { Luma([30]) } else { Luma([220]) });
    let image = DynamicImage::ImageLuma8(gray);

    let err = evaluate(&image, &layout, &key()).expect_err("no fiducials");
    assert_eq!(err.kind(), "alignment");

    let mut config = EvaluateConfig::default();
    config.align.mode = AlignmentMode::SheetBoundary;
    let err = evaluate_with_config(&image, &layout, &key(), &config).expect_err("wrong aspect");
    assert_eq!(err.kind(), "alignment");
}

#[test]
fn flat_image_fails_quality_gate() {
    let layout = test_layout();
    let image = DynamicImage::ImageLuma8(GrayImage::from_pixel(400, 500, Luma([128])));
    let err = evaluate(&image, &layout, &key()).expect_err("no contrast");
    assert!(matches!(err, EvaluateError::ImageQuality(_)));
}

#[test]
fn batch_preserves_order_and_names_failures() {
    let layout = test_layout();
    let sheets = vec![
        ("a".to_string(), photo(&layout, &student_marks(), &tilted())),
        (
            "b".to_string(),
            DynamicImage::ImageLuma8(GrayImage::from_pixel(400, 500, Luma([128]))),
        ),
        ("c".to_string(), photo(&layout, &[], &PhotoParams::default())),
    ];
    let evaluator = Evaluator::new(layout, key()).expect("valid inputs");
    let results = evaluator.evaluate_batch(&sheets);

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().expect("sheet a").score, 9.0);
    let err = results[1].as_ref().expect_err("sheet b is flat");
    assert_eq!(err.sheet_id, "b");
    assert_eq!(err.source.kind(), "image_quality");
    assert_eq!(results[2].as_ref().expect("sheet c").attempted, 0);
}

#[test]
fn penalty_and_count_as_incorrect_policies() {
    let layout = test_layout();
    let mut marks = student_marks();
    marks.push((0, 2));
    let image = photo(&layout, &marks, &tilted());

    let mut config = EvaluateConfig::default();
    config.scoring.incorrect_weight = -0.5;
    config.scoring.multiple_marked = MultipleMarkScoring::CountAsIncorrect;
    let result = evaluate_with_config(&image, &layout, &key(), &config).expect("evaluated");

    // Question 1 is now multiple (counted incorrect), question 2 wrong, 8 right.
    assert_eq!(result.counts.correct, 8);
    assert_eq!(result.counts.incorrect, 2);
    assert_eq!(result.counts.multiple_marked, 0);
    assert_eq!(result.score, 7.0);
    assert_eq!(result.incorrect_questions(), vec![1, 2]);
}

#[test]
fn dominant_mark_policy_on_partially_filled_bubble() {
    let layout = test_layout();
    let sheet = render_sheet(&layout, &student_marks(), &[(0, 3)]);
    let image = DynamicImage::ImageLuma8(photograph(&sheet, &tilted()));

    let mut config = EvaluateConfig::default();
    config.classify.adaptive_threshold = false;
    config.classify.fill_threshold = 0.3;
    let result = evaluate_with_config(&image, &layout, &key(), &config).expect("evaluated");
    let q1 = result.question(1).expect("question 1");
    assert_eq!(q1.filled, vec!['A', 'D']);
    assert_eq!(q1.mark, Mark::Selected(0));

    config.classify.multi_mark = MultiMarkPolicy::Strict;
    let result = evaluate_with_config(&image, &layout, &key(), &config).expect("evaluated");
    assert_eq!(result.question(1).expect("question 1").mark, Mark::Multiple);
}

#[test]
fn fiducial_mode_requires_layout_fiducials() {
    let layout = LayoutConfig {
        fiducials: None,
        ..test_layout()
    };
    let mut config = EvaluateConfig::default();
    config.align.mode = AlignmentMode::Fiducials;
    let err = Evaluator::with_config(layout, key(), config).expect_err("no fiducials");
    assert_eq!(err.kind(), "config");
}

#[test]
fn upside_down_photo_is_read_upright() {
    let layout = test_layout();
    let params = PhotoParams {
        angle_deg: 180.0,
        ..tilted()
    };
    let image = photo(&layout, &student_marks(), &params);

    for mode in [AlignmentMode::Fiducials, AlignmentMode::SheetBoundary] {
        let mut config = EvaluateConfig::default();
        config.align.mode = mode;
        let result = evaluate_with_config(&image, &layout, &key(), &config).expect("evaluated");
        assert_eq!(result.alignment.quarter_turns, 2, "{mode:?}");
        assert_eq!(marks_of(&result), expected_marks(), "{mode:?}");
        assert_eq!(result.score, 9.0);
        assert_eq!(result.incorrect_questions(), vec![2]);
    }
}

#[test]
fn sideways_photo_is_read_upright() {
    let layout = test_layout();
    let params = PhotoParams {
        size: [560, 440],
        angle_deg: 90.0,
        ..tilted()
    };
    let image = photo(&layout, &student_marks(), &params);
    let result = evaluate(&image, &layout, &key()).expect("evaluated");
    assert_eq!(result.alignment.quarter_turns % 2, 1);
    assert_eq!(marks_of(&result), expected_marks());
    assert_eq!(result.score, 9.0);
}

/// Answers on the default sheet: every ninth question from 4 left blank.
fn default_sheet_answers() -> Vec<Option<usize>> {
    (0..100)
        .map(|q| (q % 9 != 4).then_some((q * 3 + q / 20) % 4))
        .collect()
}

#[test]
fn default_layout_recovers_ground_truth_at_several_scales() {
    let layout = LayoutConfig::default();
    let answers = default_sheet_answers();
    let marks: Vec<(usize, usize)> = answers
        .iter()
        .enumerate()
        .filter_map(|(q, o)| o.map(|o| (q, o)))
        .collect();
    let key_options: Vec<usize> = (0..100).map(|q| (q * 3 + q / 20) % 4).collect();
    let evaluator =
        Evaluator::new(layout.clone(), AnswerKey::from_options(&key_options)).expect("valid");
    let sheet = render_sheet(&layout, &marks, &[]);
    let expected: Vec<Mark> = answers
        .iter()
        .map(|o| o.map_or(Mark::Blank, Mark::Selected))
        .collect();

    for (scale, angle_deg) in [(1.15, 2.5), (1.6, -2.0)] {
        let params = PhotoParams {
            size: [(600.0 * scale) as u32 + 90, (800.0 * scale) as u32 + 90],
            angle_deg,
            scale,
            falloff: 0.15,
            noise: 4,
            ..PhotoParams::default()
        };
        let image = DynamicImage::ImageLuma8(photograph(&sheet, &params));
        let result = evaluator.evaluate(&image).expect("evaluated");

        assert_eq!(result.alignment.mode, AlignmentMode::Fiducials);
        assert_eq!(result.alignment.quarter_turns, 0);
        assert_eq!(marks_of(&result), expected, "scale {scale}");
        assert_eq!(result.score, 89.0);
        assert_eq!(result.max_score, 100.0);
        assert_eq!(result.counts.blank, 11);
        assert_eq!(result.low_confidence_regions, 0);
    }
}
