fn main() {
    #[cfg(feature = "cli")]
    deltapack::cli::run();

    #[cfg(not(feature = "cli"))]
    {
        eprintln!("deltapack: CLI not enabled. Rebuild with `--features cli`.");
        std::process::exit(1);
    }
}
