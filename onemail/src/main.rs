fn main() {
    if let Err(e) = onemail_lib::run() {
        eprintln!("onemail: {}", e);
        std::process::exit(1);
    }
}
