fn main() {
    if let Err(err) = ingest_triage::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
