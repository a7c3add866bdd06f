//! semvec CLI entry point

fn main() {
    if let Err(e) = semvec::cli::run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
