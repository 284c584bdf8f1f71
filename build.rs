fn main() {
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() != Ok("windows") {
        return;
    }

    let mut res = winresource::WindowsResource::new();
    if let Err(e) = res.compile() {
        println!("cargo:warning=failed to embed windows resources: {e}");
    }
}
