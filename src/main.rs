fn main() {
    if let Err(err) = parcel_etl::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
