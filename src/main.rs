use std::path::PathBuf;

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("KEYWORD_INSIGHT_CONFIG").map(PathBuf::from));

    if let Err(error) = keyword_insight_lib::run(config_path.as_deref()).await {
        eprintln!("keyword-insight: {}", error);
        std::process::exit(1);
    }
}
