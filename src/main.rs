#[macro_use]
extern crate rocket;

use dotenvy::dotenv;
use rocket::{Build, Rocket};

#[launch]
fn rocket() -> Rocket<Build> {
    dotenv().ok();
    env_logger::init();

    workbond_server::rocket()
}
