fn main() {
    posturewatch_lib::run()
}
