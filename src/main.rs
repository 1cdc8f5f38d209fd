fn main() {
    if let Err(e) = safarimind_lib::run() {
        eprintln!("safarimind: {:#}", e);
        std::process::exit(1);
    }
}
