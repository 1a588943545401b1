fn main() {
    folio_cli::init_tracing();

    if let Err(error) = folio_cli::run(std::env::args_os()) {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}
