use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    air4::cli::main()
}
