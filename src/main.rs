mod app;
mod cli;

fn main() {
    let cli = cli::parse();
    ffbatch::logging::init(cli.verbose);
    app::run(cli);
}
