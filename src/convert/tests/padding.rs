use super::*;

fn field(offset: u64, bit_offset: u64, bitfield: bool, ty: Type) -> Field {
    Field {
        name: None,
        offset,
        bit_offset,
        bitfield,
        ty,
    }
}

#[test]
fn scalars_have_no_padding() {
    assert_eq!(padding_at_offset(&uint32(), 0).unwrap(), 0);
    assert_eq!(padding_at_offset(&uint32(), 3).unwrap(), 0);
    assert_eq!(padding_at_offset(&TypeData::float(64), 7).unwrap(), 0);
}

#[test]
fn record_padding_between_fields() {
    let rec = TypeData::record(
        vec![
            field(0, 0, false, uint8()),
            field(2, 0, false, TypeData::int(16, true)),
        ],
        4,
        2,
    );
    assert_eq!(padding_at_offset(&rec, 0).unwrap(), 0);
    assert_eq!(padding_at_offset(&rec, 1).unwrap(), 0xff);
    assert_eq!(padding_at_offset(&rec, 2).unwrap(), 0);
    assert_eq!(padding_at_offset(&rec, 3).unwrap(), 0);
}

#[test]
fn array_padding_repeats_per_element() {
    let rec = TypeData::record(
        vec![
            field(0, 0, false, uint8()),
            field(2, 0, false, TypeData::int(16, true)),
        ],
        4,
        2,
    );
    let arr = TypeData::array(rec, 3);
    assert_eq!(padding_at_offset(&arr, 1).unwrap(), 0xff);
    assert_eq!(padding_at_offset(&arr, 5).unwrap(), 0xff);
    assert_eq!(padding_at_offset(&arr, 9).unwrap(), 0xff);
    assert_eq!(padding_at_offset(&arr, 4).unwrap(), 0);
}

#[test]
fn bitfield_group_covers_partial_byte() {
    // struct { int a:3; int b:5; char c; }
    let rec = TypeData::record(
        vec![
            field(0, 0, true, TypeData::int(3, false)),
            field(0, 3, true, TypeData::int(5, false)),
            field(1, 0, false, uint8()),
        ],
        2,
        1,
    );
    assert_eq!(padding_at_offset(&rec, 0).unwrap(), 0);
    assert_eq!(padding_at_offset(&rec, 1).unwrap(), 0);
}

#[test]
fn bitfield_group_with_hole() {
    // struct { int a:3; } padded up to one byte: the top 5 bits of byte 0
    // are padding.
    let rec = TypeData::record(vec![field(0, 0, true, TypeData::int(3, false))], 1, 1);
    assert_eq!(padding_at_offset(&rec, 0).unwrap(), 0xf8);
}

#[test]
fn multi_byte_bitfield() {
    // struct { int a:12; } over two bytes.
    let rec = TypeData::record(vec![field(0, 0, true, TypeData::int(12, false))], 2, 1);
    assert_eq!(padding_at_offset(&rec, 0).unwrap(), 0);
    assert_eq!(padding_at_offset(&rec, 1).unwrap(), 0xf0);
}

#[test]
fn union_padding_intersects_members() {
    // union { struct { char a; short b; } s; int x; }: the int member
    // covers every byte, so nothing is padding.
    let rec = TypeData::record(
        vec![
            field(0, 0, false, uint8()),
            field(2, 0, false, TypeData::int(16, true)),
        ],
        4,
        2,
    );
    let un = TypeData::union(
        vec![field(0, 0, false, rec.clone()), field(0, 0, false, uint32())],
        4,
        4,
    );
    assert_eq!(padding_at_offset(&un, 1).unwrap(), 0);

    // Without the int member, the record's hole stays padding.
    let un2 = TypeData::union(vec![field(0, 0, false, rec)], 4, 4);
    assert_eq!(padding_at_offset(&un2, 1).unwrap(), 0xff);
}

#[test]
fn record_tail_padding() {
    let rec = TypeData::record(vec![field(0, 0, false, uint8())], 4, 4);
    assert_eq!(padding_at_offset(&rec, 0).unwrap(), 0);
    assert_eq!(padding_at_offset(&rec, 3).unwrap(), 0xff);
}
