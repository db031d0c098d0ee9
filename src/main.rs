fn main() {
    stl_lib::run()
}
