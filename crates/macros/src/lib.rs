use proc_macro::TokenStream;
use quote::quote;
use syn::ext::IdentExt;
use syn::parse::{Parse, ParseStream};
use syn::punctuated::Punctuated;
use syn::{bracketed, parse_macro_input, Ident, LitStr, Token};

/// A table or column name, written bare (`net_revenue`) or quoted
/// (`"information_schema.tables"`) when it is not a valid identifier.
struct Name(String);

impl Parse for Name {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        if input.peek(LitStr) {
            Ok(Name(input.parse::<LitStr>()?.value()))
        } else {
            Ok(Name(Ident::parse_any(input)?.to_string()))
        }
    }
}

struct Table {
    name: Name,
    columns: Vec<Name>,
}

impl Parse for Table {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let name = input.parse()?;
        input.parse::<Token![:]>()?;
        let content;
        bracketed!(content in input);
        let columns = Punctuated::<Name, Token![,]>::parse_terminated(&content)?;
        Ok(Table {
            name,
            columns: columns.into_iter().collect(),
        })
    }
}

struct SchemaInput {
    tables: Vec<Table>,
}

impl Parse for SchemaInput {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let tables = Punctuated::<Table, Token![,]>::parse_terminated(input)?;
        Ok(SchemaInput {
            tables: tables.into_iter().collect(),
        })
    }
}

/// Builds a `sqlguard_core::schema::Schema` literal.
///
/// ```ignore
/// let schema = schema! {
///     sales: [region, net_revenue, fiscal_year],
///     "information_schema.tables": [table_name],
/// };
/// ```
#[proc_macro]
pub fn schema(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as SchemaInput);

    let tables = input.tables.iter().map(|table| {
        let name = &table.name.0;
        let columns = table.columns.iter().map(|column| &column.0);
        quote! {
            (#name, ::std::vec![#(#columns),*])
        }
    });

    quote! {
        {
            let tables: ::std::vec::Vec<(&str, ::std::vec::Vec<&str>)> = ::std::vec![#(#tables),*];
            tables.into_iter().collect::<::sqlguard_core::schema::Schema>()
        }
    }
    .into()
}
