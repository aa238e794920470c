use clap::Parser;

fn main() {
    let cli = mozartctl::Cli::parse();
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("error: failed to start runtime: {err}");
            std::process::exit(1);
        }
    };
    if let Err(err) = runtime.block_on(mozartctl::run(cli)) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
