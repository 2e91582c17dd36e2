use std::{env, process};

use bankrag_cli::{flag_value, init_logging, load_settings, open_retriever};
use bankrag_retrieval::AnswerService;

fn usage(prog: &str) -> ! {
    eprintln!("Usage: {prog} \"<question>\" [--k N] [--answer] [--verbose]");
    eprintln!("Example: {prog} '¿Qué es un CDT?' --k 5 --answer");
    process::exit(2);
}

fn preview(text: &str, max: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &flat[..cut]),
        None => flat,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    let mut question = None;
    let mut k = None;
    let (mut answer, mut verbose) = (false, false);
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--k" | "-k" => {
                k = Some(flag_value::<usize>(&args, i, "--k"));
                i += 1;
            }
            "--answer" | "-a" => answer = true,
            "--verbose" | "-v" => verbose = true,
            "--help" | "-h" => usage(&args[0]),
            a if !a.starts_with('-') && question.is_none() => question = Some(a.to_string()),
            other => {
                eprintln!("Unexpected argument: {other}");
                usage(&args[0]);
            }
        }
        i += 1;
    }
    let Some(question) = question else { usage(&args[0]) };
    init_logging(verbose);

    let mut settings = load_settings()?;
    if let Some(k) = k {
        settings.retrieval.k = k;
    }
    println!("🔍 bankrag-query\n===============");
    println!("Question: {question}");
    println!("k={} fetch_k={} lambda={}", settings.retrieval.k, settings.retrieval.fetch_k, settings.retrieval.lambda);

    let retriever = open_retriever(&settings, answer).await?;

    if answer {
        let service = AnswerService::new(retriever);
        let out = service.answer(&question, &[]).await?;
        println!("\n💬 {}\n", out.answer);
        println!("Confidence: {:.2}", out.confidence);
        for src in &out.sources {
            println!("  [{}] {} / {} / {}  score={:.4}", src.id, src.source, src.section, src.subsection, src.score);
        }
        return Ok(());
    }

    let result = retriever.ask(&question, None).await?;
    println!("\n🔍 Found {} results", result.len());
    for (n, hit) in result.iter().enumerate() {
        println!(
            "\n  {}. score={:.4}  id={}  category={}  source={}",
            n + 1,
            hit.score,
            hit.chunk.id,
            hit.metadata.category,
            hit.chunk.source
        );
        if !hit.chunk.header_path.is_empty() {
            println!("     📑 {}", hit.chunk.header_path.join(" > "));
        }
        println!("     📝 {}", preview(&hit.chunk.content, 200));
    }
    Ok(())
}
