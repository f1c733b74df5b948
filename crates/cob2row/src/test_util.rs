use crate::layout::{FieldLayout, Occurs, Picture};

/// `Order` record: id, customer, amount, item count and up to three items.
pub fn order_layout() -> FieldLayout {
    FieldLayout::group(
        "Order",
        vec![
            FieldLayout::leaf(
                "orderId",
                Picture::Binary {
                    bytes: 4,
                    signed: true,
                },
            ),
            FieldLayout::leaf("customer", Picture::Alphanumeric { length: 10 }),
            FieldLayout::leaf(
                "amount",
                Picture::PackedDecimal {
                    digits: 7,
                    scale: 2,
                    signed: true,
                },
            ),
            FieldLayout::leaf(
                "itemCount",
                Picture::Binary {
                    bytes: 2,
                    signed: false,
                },
            ),
            FieldLayout::group(
                "items",
                vec![
                    FieldLayout::leaf("sku", Picture::Alphanumeric { length: 6 }),
                    FieldLayout::leaf(
                        "quantity",
                        Picture::ZonedDecimal {
                            digits: 2,
                            scale: 0,
                            signed: false,
                        },
                    ),
                ],
            )
            .with_occurs(Occurs::depending_on(0, 3, "itemCount")),
        ],
    )
}

/// Latin-1 text padded with spaces to `len`.
pub fn padded(text: &str, len: usize) -> Vec<u8> {
    let mut bytes = text.as_bytes().to_vec();
    bytes.resize(len, b' ');
    bytes
}

/// One `Order` record in Latin-1 with `items` entries of (sku, quantity).
pub fn order_record(id: i32, customer: &str, items: &[(&str, u8)]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&id.to_be_bytes());
    out.extend_from_slice(&padded(customer, 10));
    // 1234.56 packed: 0123456C
    out.extend_from_slice(&[0x01, 0x23, 0x45, 0x6C]);
    out.extend_from_slice(&(items.len() as u16).to_be_bytes());
    for (sku, qty) in items {
        out.extend_from_slice(&padded(sku, 6));
        out.extend_from_slice(format!("{qty:02}").as_bytes());
    }
    out
}
