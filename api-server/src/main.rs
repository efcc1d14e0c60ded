#[rocket::launch]
fn rocket() -> _ {
    let rocket = iam_server::rocket();
    log::info!("starting IAM API server");
    rocket
}
