fn main() -> anyhow::Result<()> {
    car_scene::run_showroom()
}
