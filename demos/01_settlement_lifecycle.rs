/// settlement lifecycle - missed weeks, delinquency, catching up and closure
use installment_ledger::{
    CreateLoanPayload, CreateTransactionPayload, ErrorKind, Ledger, LedgerConfig, MemoryStore,
    MemoryUserDirectory, Money, Rate, SafeTimeProvider, TimeSource,
};
use chrono::{Duration, TimeZone, Utc};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("=== settlement lifecycle ===\n");

    let start = Utc.with_ymd_and_hms(2025, 1, 6, 9, 0, 0).unwrap();
    let time = Arc::new(SafeTimeProvider::new(TimeSource::Test(start)));
    let controller = time.test_control().unwrap();

    let store = Arc::new(MemoryStore::new());
    let users = Arc::new(MemoryUserDirectory::new());
    let ledger = Ledger::new(store, users.clone(), time.clone(), LedgerConfig::standard());

    let borrower = users.register("sari@example.com", "Sari", time.now())?;
    let loan = ledger.create_loan(CreateLoanPayload::weekly_flat(
        borrower.id,
        Money::from_major(5_000_000),
        Rate::from_percentage(10),
        10,
        start,
    ))?;
    println!("opened loan {} for {}, outstanding {}", loan.id, loan.amount, loan.outstanding);

    for installment in ledger.loan_payments(loan.id)? {
        println!(
            "  #{:>2} due {}  {} + {} = {}",
            installment.payment_no,
            installment.due_date.format("%Y-%m-%d"),
            installment.amount,
            installment.interest,
            installment.total_amount,
        );
    }

    // borrower skips two weeks
    controller.advance(Duration::days(14));
    println!("\nadvanced to: {}", time.now().format("%Y-%m-%d"));
    println!("delinquent: {}", ledger.is_delinquent(borrower.id)?);

    let second = CreateLoanPayload::weekly_flat(
        borrower.id,
        Money::from_major(500_000),
        Rate::from_percentage(10),
        4,
        time.now(),
    );
    match ledger.create_loan(second) {
        Err(err) if err.kind() == ErrorKind::Ineligible => println!("second loan refused: {}", err),
        other => println!("unexpected: {:?}", other.map(|l| l.id)),
    }

    // underpaying is refused outright
    let Some(inquiry) = ledger.inquire(loan.id)? else {
        return Ok(());
    };
    println!("\n{} installments due, total {}", inquiry.bills.len(), inquiry.amount_due);
    let short = ledger.settle(CreateTransactionPayload {
        loan_id: loan.id,
        amount: inquiry.amount_due - Money::from_major(1),
    });
    if let Err(err) = short {
        println!("short payment rejected: {}", err);
    }

    ledger.settle(CreateTransactionPayload {
        loan_id: loan.id,
        amount: inquiry.amount_due,
    })?;
    println!("caught up, delinquent: {}", ledger.is_delinquent(borrower.id)?);

    // pay the rest week by week
    while ledger.get_loan(loan.id)?.is_active() {
        controller.advance(Duration::days(7));
        if let Some(inquiry) = ledger.inquire(loan.id)? {
            ledger.settle(CreateTransactionPayload {
                loan_id: loan.id,
                amount: inquiry.amount_due,
            })?;
        }
    }

    let view = ledger.loan_view(loan.id)?;
    println!("\nfinal state on {}:", time.now().format("%Y-%m-%d"));
    println!("{}", view.to_json_pretty()?);

    Ok(())
}
