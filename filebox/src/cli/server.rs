use server::config::Config;

pub async fn run() {
    let config = Config::from_env();
    if let Err(e) = server::run(config).await {
        eprintln!("server stopped: {e}");
        std::process::exit(1);
    }
}
