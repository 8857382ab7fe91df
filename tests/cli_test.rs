mod common;

use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::path::Path;
use std::process::Command;
use tempfile::tempdir;

fn enrollpay(catalog: &Path, state: &Path) -> Command {
    let mut cmd = Command::new(cargo_bin!("enrollpay"));
    cmd.arg("--catalog")
        .arg(catalog)
        .arg("--state-dir")
        .arg(state)
        .env_remove("ENROLLPAY_GATEWAY_SECRET");
    cmd
}

#[test]
fn test_schedule_command() {
    let mut cmd = Command::new(cargo_bin!("enrollpay"));
    cmd.args(["schedule", "--amount", "10000", "--periods", "3"]);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("period,amount\n1,3333\n2,3333\n3,3334\n"));
}

#[test]
fn test_quote_command() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let catalog = dir.path().join("catalog.csv");
    common::write_catalog(&catalog)?;

    enrollpay(&catalog, &dir.path().join("state"))
        .args(["quote", "--registration", "R1", "--enrollment", "E1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("original_fee: 18600"))
        .stdout(predicate::str::contains("final_amount: 17670"))
        .stdout(predicate::str::contains("plan: not locked"));

    Ok(())
}

#[test]
fn test_lock_cannot_be_switched() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let catalog = dir.path().join("catalog.csv");
    let state = dir.path().join("state");
    common::write_catalog(&catalog)?;

    enrollpay(&catalog, &state)
        .args(["lock", "--registration", "R1", "--enrollment", "E1", "--plan", "full"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Locked E1 to full payment"));

    enrollpay(&catalog, &state)
        .args(["lock", "--registration", "R1", "--enrollment", "E1", "--plan", "emi"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already locked to full"));

    enrollpay(&catalog, &state)
        .args(["lock", "--registration", "R1", "--enrollment", "E1", "--plan", "full"])
        .assert()
        .success();

    enrollpay(&catalog, &state)
        .args(["quote", "--registration", "R1", "--enrollment", "E1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("plan: full (locked)"));

    Ok(())
}

#[test]
fn test_installment_payments_end_to_end() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let catalog = dir.path().join("catalog.csv");
    let state = dir.path().join("state");
    common::write_catalog(&catalog)?;

    enrollpay(&catalog, &state)
        .args(["lock", "--registration", "R2", "--enrollment", "E2", "--plan", "installment"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1,3333\n2,3333\n3,3334"));

    enrollpay(&catalog, &state)
        .args(["pay", "--registration", "R2", "--enrollment", "E2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("installment period 1) amount 3333"));

    enrollpay(&catalog, &state)
        .args(["pay", "--registration", "R2", "--enrollment", "E2", "--period", "3"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Period 3 cannot be paid yet"));

    enrollpay(&catalog, &state)
        .args(["pay", "--registration", "R2", "--enrollment", "E2", "--period", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("installment period 2) amount 3333"));

    let output = enrollpay(&catalog, &state)
        .args(["ledger", "--registration", "R2"])
        .output()?;
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout)?;
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("order_id,payment_id,registration,enrollment"));
    assert!(lines[1].contains(",R2,E2,German A2,installment,1,3333,verified,"));
    assert!(lines[2].contains(",R2,E2,German A2,installment,2,3333,verified,"));

    Ok(())
}

#[test]
fn test_cancelled_payment_is_reported() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let catalog = dir.path().join("catalog.csv");
    let state = dir.path().join("state");
    common::write_catalog(&catalog)?;

    enrollpay(&catalog, &state)
        .args(["lock", "--registration", "R1", "--enrollment", "E1", "--plan", "full"])
        .assert()
        .success();

    enrollpay(&catalog, &state)
        .args(["pay", "--registration", "R1", "--enrollment", "E1", "--outcome", "cancel"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("Payment was not completed"));

    enrollpay(&catalog, &state)
        .args(["ledger", "--registration", "R1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("verified").not());

    Ok(())
}
