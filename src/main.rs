fn main() {
    if let Err(err) = csv_typed::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
