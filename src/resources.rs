//! The resource methods, generated from a table of name, path parameters, query, body, HTTP
//! method and path template.
//!
//! Every generated method returns the normalized [`ApiResponse`]. Query parameters and bodies
//! accept anything serializable: a struct, a map or `serde_json::json!({..})`.

use std::fmt::Display;
use std::path::Path;

use serde::Serialize;
use serde_json::json;

use crate::client::Client;
use crate::endpoints::{Attachment, Endpoint};
use crate::error::Result;
use crate::response::ApiResponse;

/// Expands each row into an `async fn` on [`Client`].
///
/// A row reads `name(path_params) [query q] [body b] => METHOD "path/{path_param}";` and the
/// path template may name any of the path parameters.
macro_rules! resources {
    ($(
        $(#[$attr:meta])*
        $name:ident ( $($param:ident),* ) $(query $query:ident)? $(body $body:ident)? => $method:ident $path:literal;
    )*) => {
        impl Client {
            $(
                $(#[$attr])*
                #[instrument(skip_all)]
                pub async fn $name(
                    &self,
                    $($param: impl Display,)*
                    $($query: &(impl Serialize + ?Sized),)?
                    $($body: &(impl Serialize + ?Sized),)?
                ) -> Result<ApiResponse> {
                    let path = format!($path $(, $param = $param)*);
                    let endpoint = Endpoint::new(reqwest::Method::$method, path);
                    $(let endpoint = endpoint.query($query)?;)?
                    $(let endpoint = endpoint.json($body)?;)?
                    self.request(endpoint).await
                }
            )*
        }
    };
}

resources! {
    /// Gets an attachment: the metadata in `metadata` and the file itself in `content`.
    get_attachment(attachment_id) => GET "attachments/{attachment_id}";
    delete_attachment(attachment_id) => DELETE "attachments/{attachment_id}";

    /// Supports `previousId`, `orderById`, `orderByOrderNo` and `size`.
    get_bank_accounts() query parameters => GET "bankaccounts";

    /// Removes a product allocation from a bank statement event.
    delete_products_from_bank_statement(statement_id, event_id) => DELETE "bankstatements/{statement_id}/events/{event_id}/products";
    /// Allocates a product to a bank statement event.
    put_products_to_bank_statement(statement_id, event_id) body product => PUT "bankstatements/{statement_id}/events/{event_id}/products";

    /// Finds business partners by `name`, `code`, `customerNo`, `type`, `active` and so on.
    get_business_partners() query parameters => GET "businesspartners";
    get_business_partner(partner_id) => GET "businesspartners/{partner_id}";
    update_business_partner(partner_id) body partner => PUT "businesspartners/{partner_id}";
    /// Person register details of the logged in user.
    get_business_partner_details() => GET "businesspartners/personaldetails";

    /// The chart of accounts.
    get_coa() => GET "coa";

    get_company() => GET "company";
    update_company() body company => PUT "company";

    get_currencies() => GET "currencies";
    /// The default currency of the company.
    get_currency() => GET "currencies/company";
    /// Supports `baseCurrency`, `currency`, `day` and `rateType`.
    get_exchange_rate() query parameters => GET "currencies/exchangerate";
    get_latest_currency_rate() query parameters => GET "currencies/latest";

    get_dimensions() => GET "dimensions";
    update_dimension() body dimension => PUT "dimensions";
    get_dimension(dimension_id) => GET "dimensions/{dimension_id}";
    create_dimension_item(dimension_id) body item => POST "dimensions/{dimension_id}/items";
    update_dimension_item(dimension_id) body item => PUT "dimensions/{dimension_id}/items";

    /// Fiscal years from newest to oldest.
    get_fiscal_years() => GET "fiscalyears";

    /// Supports `status`, `startDate`, `endDate`, `types`, `orderById`, `previousId` and more.
    get_invoices() query parameters => GET "invoices";
    get_invoice(invoice_id) => GET "invoices/{invoice_id}";
    post_invoice() body invoice => POST "invoices";
    approve_invoice(invoice_id) body event => PUT "invoices/{invoice_id}/approve";
    get_invoice_comments(invoice_id) => GET "invoices/{invoice_id}/comments";
    post_invoice_comment(invoice_id) body comment => POST "invoices/{invoice_id}/comments";
    get_invoice_payment_events(invoice_id) query parameters => GET "invoices/{invoice_id}/paymentevents";
    delete_invoice_payment_event(invoice_id, payment_event_id) => DELETE "invoices/{invoice_id}/paymentevents/{payment_event_id}";
    markpaid_invoice(invoice_id) body payment => PUT "invoices/{invoice_id}/paymentevents/markpaid";
    send_invoice(invoice_id) => PUT "invoices/{invoice_id}/send";
    send_invoice_to_circulation(invoice_id) => PUT "invoices/{invoice_id}/sendToCirculation";
    verify_invoice(invoice_id) body event => PUT "invoices/{invoice_id}/verify";
    confirm_invoice(transaction_id) => PUT "invoices/{transaction_id}/confirm";
    /// Pays purchase invoices. Requires a valid one time password in the body.
    pay_invoice() body payment => PUT "invoices/pay";

    get_ledger_receipts() query parameters => GET "ledgerreceipts";
    get_ledger_receipt(receipt_id) => GET "ledgerreceipts/{receipt_id}";
    post_ledger_receipt() body receipt => POST "ledgerreceipts";
    update_ledger_receipt(receipt_id) body receipt => PUT "ledgerreceipts/{receipt_id}";

    get_payments() query parameters => GET "payments";
    post_payment() body payment => POST "payments";
    get_payment(payment_id) => GET "payments/{payment_id}";
    delete_payment(payment_id) => DELETE "payments/{payment_id}";
    cancel_payment(payment_id) => PUT "payments/{payment_id}/cancel";
    confirm_payment(transaction_id) => PUT "payments/{transaction_id}/confirm";
    payments_direct_bank_transfers() body transfer => POST "payments/directbanktransfers";
    payments_error_messages() query parameters => GET "payments/errormessages";

    get_products() query parameters => GET "products";
    get_product(product_id) => GET "products/{product_id}";
    /// Supports `productType`.
    get_product_groups() query parameters => GET "products/groups";

    get_reference_payments() query parameters => GET "referencepayments";

    get_session_info() => GET "sessioninfo";

    get_users() => GET "users";
    update_user() body user => PUT "users";
    user_transaction_confirm(transaction_id) => PUT "users/{transaction_id}/confirm";
    /// Sends a one time password to the logged in user by SMS.
    send_one_time_pass() => GET "users/otp";
    get_user_profile(user_id) => GET "users/profiles/{user_id}";

    /// The default VATs of the company's country.
    get_vats() => GET "vats/default";
    /// Supports `countryCode`.
    get_vats_country() query parameters => GET "vats/country";
}

impl Client {
    /// Uploads the file at `path` with its metadata (`name`, `referenceType`, `referenceId`).
    #[instrument(skip(self, meta, path))]
    pub async fn post_attachment(
        &self,
        meta: &impl Serialize,
        path: impl AsRef<Path>,
    ) -> Result<ApiResponse> {
        let attachment = Attachment::from_path(meta, path).await?;
        self.request(Endpoint::post("attachments").multipart(attachment))
            .await
    }

    /// Bank statements between two `yyyy-MM-dd` dates.
    #[instrument(skip(self))]
    pub async fn get_bank_statements(&self, start_date: &str, end_date: &str) -> Result<ApiResponse> {
        let endpoint = Endpoint::get("bankstatements").query(&json!({
            "startDate": start_date,
            "endDate": end_date,
        }))?;
        self.request(endpoint).await
    }
}
