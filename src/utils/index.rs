/// Render a satoshi amount as a decimal coin string, e.g. `150000000` -> `"1.50000000"`.
pub fn format_token_amount(amount: u64, decimals: u32) -> String {
    if decimals == 0 {
        return amount.to_string();
    }
    let scale = 10u64.pow(decimals);
    format!(
        "{}.{:0width$}",
        amount / scale,
        amount % scale,
        width = decimals as usize
    )
}
