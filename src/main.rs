use colored::Colorize;

fn main() {
    if let Err(err) = dictum::run() {
        eprintln!("{} {}", "error:".red(), err);
        std::process::exit(1);
    }
}
