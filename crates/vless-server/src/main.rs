use clap::Parser;
use vless_server::cli::{self, Args};

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(e) = cli::run(args).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
