fn main() {
    rollsync_lib::init_logging();

    if let Err(error) = rollsync_lib::run() {
        eprintln!("error: {}", error.message());
        std::process::exit(1);
    }
}
