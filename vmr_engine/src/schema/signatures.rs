use crate::db_types::SourceKind;

/// One canonical field together with the header keywords that identify it.
///
/// Keywords are matched case-, whitespace- and punctuation-insensitively as substrings of the normalized header.
/// Russian variants are included because several upstream systems export localized headers.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub keywords: &'static [&'static str],
}

/// The static signature of one source kind: which canonical fields its files must carry, which are nice to have,
/// and how confident the scorer must be before the kind is accepted.
#[derive(Debug, Clone, Copy)]
pub struct SchemaSignature {
    pub kind: SourceKind,
    pub required: &'static [FieldSpec],
    pub optional: &'static [FieldSpec],
    pub threshold: f64,
}

/// Score contributed by each matched optional field.
pub const OPTIONAL_BONUS: f64 = 0.1;
/// Optional fields can never contribute more than this in total.
pub const OPTIONAL_BONUS_CAP: f64 = 0.3;

const fn field(name: &'static str, keywords: &'static [&'static str]) -> FieldSpec {
    FieldSpec { name, keywords }
}

const PRIMARY_REQUIRED: &[FieldSpec] = &[
    field("order_number", &["order number", "номер заказа"]),
    field("machine_code", &["machine code", "код автомата"]),
    field("creation_time", &["creation time", "время создания"]),
    field("paying_time", &["paying time", "время оплаты"]),
    field("delivery_time", &["delivery time", "время выдачи"]),
    field("order_price", &["order price", "цена заказа", "price"]),
];

const PRIMARY_OPTIONAL: &[FieldSpec] = &[
    field("brewing_time", &["brewing time", "время приготовления"]),
    field("refund_time", &["refund time", "время возврата"]),
    field("goods_name", &["goods name", "название товара"]),
    field("taste_name", &["taste name", "вкус"]),
    field("address", &["address", "адрес"]),
    field("order_resource", &["order resource", "источник заказа"]),
    field("payment_status", &["payment status", "статус платежа"]),
    field("brew_status", &["brew status", "статус приготовления"]),
    field("reason", &["reason", "причина"]),
];

const ENRICHMENT_REQUIRED: &[FieldSpec] = &[
    field("order_number", &["order number", "номер заказа"]),
    field("machine_code", &["machine code", "код автомата"]),
    field("event_time", &["order time", "event time", "time", "время"]),
    field("order_price", &["order price", "цена заказа", "price"]),
    field("payment_type", &["payment type", "тип платежа"]),
];

const ENRICHMENT_OPTIONAL: &[FieldSpec] = &[
    field("goods_id", &["goods id", "ид товара"]),
    field("goods_name", &["goods name", "название товара"]),
    field("machine_category", &["machine category", "категория автомата"]),
    field("order_resource", &["order resource", "ресурс заказа"]),
    field("username", &["username", "имя пользователя"]),
    field("bonus_amount", &["bonus", "бонус"]),
    field("ikpu", &["ikpu", "икпу"]),
    field("barcode", &["barcode", "штрихкод"]),
];

const FISCAL_REQUIRED: &[FieldSpec] = &[
    field("fiscal_check_number", &["fiscal check number", "fiscal id", "номер чека"]),
    field("fiscal_time", &["fiscal time", "время фискализации", "time", "дата"]),
    field("amount", &["amount", "сумма", "price"]),
    field("taxpayer_id", &["taxpayer", "инн", "налогоплательщик"]),
];

const FISCAL_OPTIONAL: &[FieldSpec] = &[
    field("cash_register_id", &["cash register", "ид кассы"]),
    field("shift_number", &["shift number", "номер смены"]),
    field("receipt_type", &["receipt type", "тип чека"]),
];

const PAYME_REQUIRED: &[FieldSpec] = &[
    field("transaction_id", &["transaction id", "ид транзакции"]),
    field("transaction_time", &["transaction time", "время транзакции", "time"]),
    field("amount", &["amount", "сумма"]),
    field("masked_pan", &["masked pan", "маскированный номер"]),
    field("terminal_id", &["terminal", "ид терминала"]),
];

const PAYME_OPTIONAL: &[FieldSpec] = &[
    field("merchant_id", &["merchant", "ид мерчанта"]),
    field("status", &["status", "статус"]),
    field("commission", &["commission", "комиссия"]),
    field("phone_number", &["phone", "номер телефона"]),
    field("username", &["username", "имя пользователя"]),
    field("reference_number", &["reference", "референс"]),
];

const CLICK_REQUIRED: &[FieldSpec] = &[
    field("transaction_id", &["transaction id", "ид транзакции"]),
    field("transaction_time", &["transaction time", "время транзакции", "time"]),
    field("amount", &["amount", "сумма"]),
    field("card_number", &["card number", "номер карты"]),
    field("service_id", &["service id", "ид сервиса"]),
];

const CLICK_OPTIONAL: &[FieldSpec] = &[
    field("merchant_id", &["merchant", "ид мерчанта"]),
    field("status", &["status", "статус"]),
    field("commission", &["commission", "комиссия"]),
    field("error_code", &["error code", "код ошибки"]),
    field("click_trans_id", &["click trans id", "внутренний ид"]),
];

const UZUM_REQUIRED: &[FieldSpec] = &[
    field("transaction_id", &["transaction id", "ид транзакции"]),
    field("transaction_time", &["transaction time", "время транзакции", "time"]),
    field("amount", &["amount", "сумма"]),
    field("masked_pan", &["masked pan", "маскированный номер"]),
    field("shop_id", &["shop id", "ид магазина"]),
];

const UZUM_OPTIONAL: &[FieldSpec] = &[
    field("merchant_id", &["merchant", "ид мерчанта"]),
    field("status", &["status", "статус"]),
    field("commission", &["commission", "комиссия"]),
    field("cashback_amount", &["cashback", "кэшбэк"]),
    field("username", &["username", "имя пользователя"]),
];

/// All signatures, in auto-detection priority order. When two kinds score equally, the earlier entry wins.
static SIGNATURES: [SchemaSignature; 6] = [
    SchemaSignature {
        kind: SourceKind::PrimaryLog,
        required: PRIMARY_REQUIRED,
        optional: PRIMARY_OPTIONAL,
        threshold: 0.7,
    },
    SchemaSignature {
        kind: SourceKind::Enrichment,
        required: ENRICHMENT_REQUIRED,
        optional: ENRICHMENT_OPTIONAL,
        threshold: 0.7,
    },
    // Fiscal and gateway vocabularies are more distinctive, so they must clear a stricter bar.
    SchemaSignature {
        kind: SourceKind::FiscalReceipt,
        required: FISCAL_REQUIRED,
        optional: FISCAL_OPTIONAL,
        threshold: 0.8,
    },
    SchemaSignature {
        kind: SourceKind::GatewayPayme,
        required: PAYME_REQUIRED,
        optional: PAYME_OPTIONAL,
        threshold: 0.8,
    },
    SchemaSignature {
        kind: SourceKind::GatewayClick,
        required: CLICK_REQUIRED,
        optional: CLICK_OPTIONAL,
        threshold: 0.8,
    },
    SchemaSignature {
        kind: SourceKind::GatewayUzum,
        required: UZUM_REQUIRED,
        optional: UZUM_OPTIONAL,
        threshold: 0.8,
    },
];

pub fn signatures() -> &'static [SchemaSignature] {
    &SIGNATURES
}
