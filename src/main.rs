fn main() -> anyhow::Result<()> {
    livecall_lib::run()
}
