use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use policybot_answer::{Engine, Session};
use policybot_cli::{init_logging, load_settings};

#[derive(Parser)]
#[command(name = "policybot-chat")]
#[command(about = "Ask PolicyBot questions about Met99", long_about = None)]
struct Cli {
    #[arg(long)]
    config_env: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(cli.config_env.as_deref())?;
    init_logging(&settings.logging.filter);

    let engine = match Engine::start(&settings).await {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("❌ Unrecoverable startup error: {e}");
            std::process::exit(1);
        }
    };

    let mut session = Session::new();
    if let Some(welcome) = session.turns().first() {
        println!("🛡️  {}\n", welcome.content);
    }
    println!("Commands: /history, /quit\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else { break };
        let question = line.trim();
        match question {
            "" => continue,
            "/quit" | "/exit" => break,
            "/history" => {
                println!("{}\n", session.transcript());
                continue;
            }
            _ => {}
        }
        match session.ask(&engine, question).await {
            Ok(outcome) => println!("\n{}\n", outcome.answer),
            Err(e) => eprintln!("\n⚠️  There was an error processing the answer: {e}\n"),
        }
    }
    println!("👋 Bye!");
    Ok(())
}
