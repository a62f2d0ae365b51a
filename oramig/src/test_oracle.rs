#![allow(dead_code)]

//! Oracle test infrastructure module.
//!
//! Starts one shared `gvenzl/oracle-free` container for the whole test run and hands every test
//! its own freshly created user, so tests never see each other's tables or locks.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Once, OnceLock};
use std::time::Duration;

use testcontainers::core::{IntoContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{GenericImage, ImageExt};
use uuid::Uuid;

/// Host port mapped to the container's listener. Zero until the container is up.
static ORACLE_PORT: AtomicU16 = AtomicU16::new(0);

/// Guards the single container start shared by every live test in the binary.
static ORACLE_INIT: Once = Once::new();

/// Runtime the container was started on, held until the test process exits.
static TOKIO_RT: OnceLock<tokio::runtime::Runtime> = OnceLock::new();

const SYSTEM_PASSWORD: &str = "oramig_test";
const SERVICE_NAME: &str = "FREEPDB1";
const TEST_PASSWORD: &str = "Oramig_test_1";

/// Environment variable that switches the live database tests on.
pub const LIVE_ENV: &str = "ORAMIG_LIVE";

/// Whether tests that need docker and the Oracle client libraries should run.
///
/// Live tests call this first and return early when it is false, so a plain `cargo test` still
/// compiles and links them.
pub fn live_tests_enabled() -> bool {
    std::env::var(LIVE_ENV).is_ok_and(|value| value == "1")
}

fn ensure_oracle_started() {
    ORACLE_INIT.call_once(|| {
        let rt = tokio::runtime::Runtime::new().expect("failed to create tokio runtime");

        let port = rt.block_on(async {
            let container = GenericImage::new("gvenzl/oracle-free", "23-slim-faststart")
                .with_exposed_port(1521.tcp())
                .with_wait_for(WaitFor::message_on_stdout("DATABASE IS READY TO USE!"))
                .with_env_var("ORACLE_PASSWORD", SYSTEM_PASSWORD)
                .with_startup_timeout(Duration::from_secs(600))
                .start()
                .await
                .expect("failed to start oracle container");

            let port = container
                .get_host_port_ipv4(1521)
                .await
                .expect("failed to get oracle port");

            // The database outlives every test user; it goes away when the test process exits.
            std::mem::forget(container);

            port
        });

        ORACLE_PORT.store(port, Ordering::SeqCst);
        let _ = TOKIO_RT.set(rt);
    });
}

fn connect_string() -> String {
    ensure_oracle_started();
    format!(
        "//127.0.0.1:{}/{}",
        ORACLE_PORT.load(Ordering::SeqCst),
        SERVICE_NAME
    )
}

/// Create a user with a unique name and the privileges the driver needs.
/// Returns an `oracle://` URL that logs in as that user.
pub fn fresh_oracle_user() -> String {
    let admin = oracle::Connection::connect("system", SYSTEM_PASSWORD, connect_string())
        .expect("failed to connect as system");

    let user = format!("T{}", Uuid::new_v4().simple()).to_uppercase();
    for statement in [
        format!("CREATE USER {} IDENTIFIED BY \"{}\"", user, TEST_PASSWORD),
        format!("GRANT CREATE SESSION, CREATE TABLE TO {}", user),
        format!("GRANT EXECUTE ON SYS.DBMS_LOCK TO {}", user),
        format!("ALTER USER {} QUOTA UNLIMITED ON USERS", user),
    ] {
        admin
            .execute(&statement, &[])
            .unwrap_or_else(|e| panic!("failed to run `{}`: {}", statement, e));
    }
    admin.close().expect("failed to close admin connection");

    format!(
        "oracle://{}:{}@127.0.0.1:{}/{}",
        user,
        TEST_PASSWORD,
        ORACLE_PORT.load(Ordering::SeqCst),
        SERVICE_NAME
    )
}

/// A URL for a fresh user with a uniquely named migrations table.
pub fn get_test_url() -> String {
    format!(
        "{}?x-migrations-table=migrations_{}",
        fresh_oracle_user(),
        Uuid::new_v4().simple()
    )
}
