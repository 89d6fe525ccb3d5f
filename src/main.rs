fn main() {
    if let Err(err) = fieldguide_lib::run() {
        eprintln!("fieldguide: {err:#}");
        std::process::exit(1);
    }
}
