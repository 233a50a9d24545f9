const DEFAULT_COMMAND: &str =
    "Go to priceline.com and search for flights from Las Vegas to San Francisco for next weekend";

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = if args.is_empty() {
        DEFAULT_COMMAND.to_string()
    } else {
        args.join(" ")
    };

    if let Err(e) = tabpilot_lib::run(command).await {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
