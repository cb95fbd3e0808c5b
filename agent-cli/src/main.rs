use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = agent_cli::Cli::parse();
    std::process::exit(agent_cli::run(cli).await);
}
