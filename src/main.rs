fn main() {
    thermalview_lib::run()
}
