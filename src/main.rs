use clap::Parser;
use drawdown::api::{Command, Invocation};

#[tokio::main]
async fn main() {
    env_logger::init();

    let invocation = Invocation::parse();
    let output = match invocation.command {
        Command::Serve { port } => {
            if let Err(e) = drawdown::api::run_http_server(port).await {
                eprintln!("Server error: {e}");
                std::process::exit(1);
            }
            return;
        }
        Command::Simulate(cli) => drawdown::api::simulate_json(cli),
        Command::Solve(args) => drawdown::api::solve_json(args),
    };

    match output {
        Ok(json) => println!("{json}"),
        Err(msg) => {
            eprintln!("{msg}");
            std::process::exit(1);
        }
    }
}
