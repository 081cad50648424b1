fn main() {
    cosmicflows_pipeline::cli::run();
}
