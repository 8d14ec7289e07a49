use omrscore::{AnswerKey, EvaluateConfig, Evaluator, LayoutConfig};
use std::error::Error;
use std::path::Path;

fn main() -> Result<(), Box<dyn Error>> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 4 {
        eprintln!(
            "Usage: {} <layout.json> <key.json> <sheet.jpg> [config.json] [out.json]",
            args[0]
        );
        std::process::exit(2);
    }

    let layout = LayoutConfig::from_json_file(Path::new(&args[1]))?;
    let key = AnswerKey::from_json_file(Path::new(&args[2]))?;
    let image = image::open(&args[3])?;
    let config = match args.get(4) {
        Some(path) => EvaluateConfig::from_json_file(Path::new(path))?,
        None => EvaluateConfig::default(),
    };

    let evaluator = Evaluator::with_config(layout, key, config)?;
    let result = evaluator.evaluate(&image)?;

    println!(
        "Score {:.2} / {:.2} ({:.1}%), {} attempted, {} low-confidence regions.",
        result.score,
        result.max_score,
        result.percentage,
        result.attempted,
        result.low_confidence_regions
    );
    let incorrect = result.incorrect_questions();
    if !incorrect.is_empty() {
        println!("Incorrect: {incorrect:?}");
    }

    if let Some(out_path) = args.get(5) {
        let json = serde_json::to_string_pretty(&result)?;
        std::fs::write(out_path, json)?;
        println!("Wrote {out_path}");
    }
    Ok(())
}
