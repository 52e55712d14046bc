fn main() -> anyhow::Result<()> {
    authzed_loadtest::cli::execute()
}
