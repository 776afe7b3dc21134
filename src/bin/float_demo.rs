//! Client/server round trip: the server evaluates x³ − 3.1x + 5.3 on
//! values it only ever sees encrypted.
//!
//! Run with `RUST_LOG=debug` to watch levels and scales being managed.

use encnum::prelude::*;

type AppResult<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// The server side: only public operations on encrypted input.
fn process(session: &Session, x: &EncryptedValue) -> encnum::error::Result<EncryptedValue> {
    let cube = session.pow(x, 3)?;
    let linear = session.mul(x, 3.1)?;
    let diff = session.sub(&cube, &linear)?;
    session.add(&diff, 5.3)
}

fn main() -> AppResult<()> {
    env_logger::init();

    let mut session = Session::new(SessionConfig::default())?;
    let keys = session.generate_keypair()?;
    session.install(keys)?;
    session.display_config();
    println!();

    let sensitive_data = [-3.2, 0.1, 5.3, 50.6];
    for entry in sensitive_data {
        let insecure = entry * entry * entry - 3.1 * entry + 5.3;
        let encrypted = session.encrypt(entry)?;
        let secure = session.decrypt(&process(&session, &encrypted)?)?.as_f64();
        println!("{entry:8.1} | {insecure:12.2} {secure:12.2}");
    }
    Ok(())
}
