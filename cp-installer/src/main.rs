fn main() -> anyhow::Result<()> {
    cp_installer::run()
}
