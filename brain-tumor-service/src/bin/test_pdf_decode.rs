use anyhow::Result;
use brain_tumor_service::ServiceConfig;
use brain_tumor_service::collaborators::{
    AnswerGenerator, ChatCompletionsClient, DocumentDecoder, LlmAnswerGenerator, PdfDecoder,
};
use session_store::{InMemorySessionStore, SessionStore};
use std::env;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt().with_env_filter("info").init();
    dotenvy::dotenv().ok();

    println!("PDF -> page images -> session -> answer");
    println!("=======================================");

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <pdf_file_path> [question]", args[0]);
        eprintln!("Example: {} /path/to/report.pdf \"What is the diagnosis?\"", args[0]);
        std::process::exit(1);
    }

    let raw = std::fs::read(&args[1])?;
    println!("Read {} bytes from {}", raw.len(), args[1]);

    let pages = PdfDecoder.decode(&raw).await?;
    for (index, page) in pages.iter().enumerate() {
        println!("  page {}: {} ({} bytes)", index + 1, page.media_type, page.len());
    }

    let store = InMemorySessionStore::default();
    let session_id = store.create(pages).await?;
    let session = store.get(&session_id).await?;
    println!("Session {} holds {} bytes", session_id, session.payload_bytes());

    let Some(question) = args.get(2) else {
        println!("No question given, skipping answer generation");
        return Ok(());
    };

    let config = match ServiceConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            println!("Skipping answer generation - {}", e);
            return Ok(());
        }
    };

    let client = ChatCompletionsClient::new(reqwest::Client::new(), &config.llm);
    let generator = LlmAnswerGenerator::new(client, config.llm.answer_model.clone());
    config.token_budget.check(session.pages(), question)?;
    let answer = generator.answer(session.pages(), question).await?;

    println!();
    println!("{}", serde_json::to_string_pretty(&answer)?);

    Ok(())
}
