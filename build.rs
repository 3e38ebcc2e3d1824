#[allow(unreachable_code)]
fn main() {
    #[cfg(not(feature = "backend-sql"))]
    return;

    // migrations are embedded with sqlx::migrate!, rebuild when they change
    println!("cargo:rerun-if-changed=migrations");
}
