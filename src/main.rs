fn main() {
    let exit_code = qrcam_lib::run();
    std::process::exit(exit_code.as_i32());
}
