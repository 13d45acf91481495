use sinatra_cli::{Command, Settings};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let command = Command::parse(std::env::args().skip(1)).unwrap_or_else(|e| {
        eprintln!("{e}");
        std::process::exit(2);
    });
    let settings = Settings::from_env().expect("environment");
    let context = settings.context().expect("client setup");

    let result = match command {
        Command::Watch => sinatra_cli::watch(&context).await,
        Command::Profile(user_id) => sinatra_cli::profile(&context, &user_id)
            .await
            .map(|profile| {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&profile).expect("profile is serializable")
                );
            }),
        Command::Genres => sinatra_cli::genres(&context).await.map(|bars| match bars {
            Some(bars) => {
                for bar in bars {
                    println!("{:>5.1}% {}", bar.percent, bar.name);
                }
            }
            None => println!("genres unavailable"),
        }),
        Command::Logout => {
            context.logout().await;
            Ok(())
        }
    };
    if let Err(e) = result {
        tracing::error!(error = %e, "command failed");
        std::process::exit(1);
    }
}
