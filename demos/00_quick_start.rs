/// quick start - open a weekly loan and settle its first installment
use installment_ledger::{
    CreateLoanPayload, CreateTransactionPayload, Ledger, LedgerConfig, MemoryStore,
    MemoryUserDirectory, Money, Rate, SafeTimeProvider, TimeSource,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let store = Arc::new(MemoryStore::new());
    let users = Arc::new(MemoryUserDirectory::new());
    let time = Arc::new(SafeTimeProvider::new(TimeSource::System));
    let ledger = Ledger::new(store, users.clone(), time.clone(), LedgerConfig::from_env()?);

    let borrower = users.register("budi@example.com", "Budi", time.now())?;

    // 1,000,000 over one week at 10% flat annual
    let loan = ledger.create_loan(CreateLoanPayload::weekly_flat(
        borrower.id,
        Money::from_major(1_000_000),
        Rate::from_percentage(10),
        1,
        time.now(),
    ))?;
    println!("{}", loan);

    // the only installment falls inside the one-week window
    if let Some(inquiry) = ledger.inquire(loan.id)? {
        println!("{}", inquiry.to_json_pretty()?);

        let transaction = ledger.settle(CreateTransactionPayload {
            loan_id: loan.id,
            amount: inquiry.amount_due,
        })?;
        if let Some(transaction) = transaction {
            println!("settled {} as {}", transaction.total_amount, transaction.reference);
        }
    }

    println!("{}", ledger.loan_view(loan.id)?.to_json_pretty()?);

    Ok(())
}
