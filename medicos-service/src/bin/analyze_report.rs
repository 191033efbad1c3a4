use std::env;
use std::path::Path;

use anyhow::Result;
use medicos_service::{ServiceConfig, create_app_state};

const PREVIEW_CHARS: usize = 500;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    println!("Medical Report -> Text -> Simplified Summary");
    println!("============================================");

    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("Usage: {} <report_path>", args[0]);
        eprintln!("Accepts .pdf, .png, .jpg/.jpeg and .txt files");
        std::process::exit(1);
    }
    let report_path = Path::new(&args[1]);

    let config = match ServiceConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            eprintln!("Example: export OPENROUTER_API_KEY='your_key_here'");
            std::process::exit(1);
        }
    };

    println!("Processing report: {}", report_path.display());
    println!("Chat model: {}", config.chat_model);
    println!("OCR model: {}", config.ocr_model);
    println!();

    let state = create_app_state(&config).await?;

    match state.analyzer.analyze(report_path, None).await {
        Ok(analysis) => {
            println!(
                "Extracted {} characters of text",
                analysis.source_text.chars().count()
            );
            println!();

            println!("Extracted Text (first {PREVIEW_CHARS} chars):");
            println!("────────────────────────────────────");
            println!("{}", preview(&analysis.source_text, PREVIEW_CHARS));
            println!();

            println!("Simplified Summary:");
            println!("──────────────────");
            println!("{}", analysis.summary);
        }
        Err(e) => {
            eprintln!("{e}");
            eprintln!();
            eprintln!("Troubleshooting:");
            eprintln!("   - Check the file exists and is readable");
            eprintln!("   - Ensure OPENROUTER_API_KEY is valid");
            eprintln!("   - Scanned PDFs need poppler (pdftoppm, pdfinfo) for page rendering");
            std::process::exit(1);
        }
    }

    Ok(())
}

fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let truncated: String = text.chars().take(max_chars).collect();
        format!("{truncated}...")
    } else {
        text.to_string()
    }
}
