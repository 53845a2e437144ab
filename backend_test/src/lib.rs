use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{parse_macro_input, spanned::Spanned, FnArg, Ident, ItemFn, Pat, Signature, Type};

/// Transform an asynchronous test into a synchronous one, inject
/// dependencies, and ensure that any test database is dropped regardless of
/// how the test terminates.
///
/// Injectable dependencies are `crate::election::Election`,
/// [`rocket::local::asynchronous::Client`] and [`mongodb::Database`]; a
/// client talks to the same election that is injected alongside it. The
/// election lives in memory unless the test asks for a `Database`, in which
/// case it is backed by a fresh MongoDB database and the test is skipped when
/// no `db_uri` is configured. Pass `seeded` to register the example
/// candidates and voters before the test runs.
#[proc_macro_attribute]
pub fn backend_test(args: TokenStream, input: TokenStream) -> TokenStream {
    let mut item_fn = parse_macro_input!(input as ItemFn);

    // Extract type information and reject invalid function signatures.
    let (test_args, has_db) = match check_sig(item_fn.sig.clone()) {
        Ok(args) => args,
        Err(err) => {
            return err.into_compile_error().into();
        }
    };

    // Rename the future so the test can have its original name.
    let name = item_fn.sig.ident.clone();
    let new_name = format_ident!("{}_fut", name);
    item_fn.sig.ident = new_name.clone();

    // Seed the election with example data if needed.
    let maybe_seed = match parse_macro_input!(args as Option<Ident>) {
        Some(arg) if arg == "seeded" => quote! {
            crate::election::examples::seed(&election).await;
        },
        Some(arg) => {
            return syn::Error::new(arg.span(), "Expected no argument or `seeded`")
                .into_compile_error()
                .into();
        }
        None => TokenStream2::new(),
    };

    // Choose where the election is stored.
    let store_setup = if has_db {
        quote! {
            let Some(db) = crate::config::test_database().await else {
                log::warn!("No `db_uri` configured, skipping database test");
                return None;
            };
            let election = crate::config::election_for_database(&db).await.unwrap();
            let db = Some(db);
        }
    } else {
        quote! {
            let election = crate::election::Election::in_memory();
            let db: Option<mongodb::Database> = None;
        }
    };

    // Rewrite the test function.
    quote! {
        #[test]
        fn #name() {
            /// Test setup.
            async fn setup() -> Option<(
                rocket::local::asynchronous::Client,
                crate::election::Election,
                Option<mongodb::Database>,
            )> {
                log4rs_test_utils::test_logging::init_logging_once_for(["ballot_backend"], None, None);

                #store_setup

                #maybe_seed

                let rocket_client = rocket::local::asynchronous::Client::tracked(crate::rocket_for_election(election.clone()))
                    .await
                    .unwrap();

                Some((rocket_client, election, db))
            }

            /// The test itself.
            #item_fn

            let runtime = rocket::tokio::runtime::Builder::new_multi_thread()
                .thread_name("rocket-worker-test-thread")
                .worker_threads(2)
                .enable_all()
                .build()
                .unwrap();

            runtime.block_on(async {
                #[allow(unused_variables)]
                let Some((rocket_client, election, db)) = setup().await else {
                    return;
                };

                // Run the test, catching any panics so the database is still dropped.
                let result = rocket::futures::FutureExt::catch_unwind(
                    std::panic::AssertUnwindSafe(#new_name(#(#test_args),*)),
                )
                .await;

                // Run the cleanup.
                if let Some(db) = db {
                    db.drop(None).await.unwrap();
                }

                // If the test panicked, re-raise the panic.
                if let Err(cause) = result {
                    std::panic::resume_unwind(cause);
                }
            });
        }
    }
    .into()
}

/// Ensure the wrapped test is async, extract parameters to inject, and reject unknown parameters.
fn check_sig(sig: Signature) -> Result<(Vec<TokenStream2>, bool), syn::Error> {
    if sig.asyncness.is_none() {
        return Err(syn::Error::new(sig.span(), "Test must be marked `async`"));
    }

    let mut has_client = false;
    let mut has_election = false;
    let mut has_db = false;
    let mut args = vec![];

    for input in &sig.inputs {
        if let FnArg::Typed(pat_type) = input {
            if let Pat::Ident(_) = &*pat_type.pat {
                if let Type::Path(type_path) = &*pat_type.ty {
                    if let Some(type_ident) = type_path.path.get_ident() {
                        if type_ident == "Client" {
                            if has_client {
                                return Err(syn::Error::new(input.span(), "Test cannot accept more than one `rocket::local::asynchronous::Client`"));
                            }
                            has_client = true;
                            args.push(quote! { rocket_client });
                            continue;
                        } else if type_ident == "Election" {
                            if has_election {
                                return Err(syn::Error::new(
                                    input.span(),
                                    "Test cannot accept more than one `Election`",
                                ));
                            }
                            has_election = true;
                            args.push(quote! { election });
                            continue;
                        } else if type_ident == "Database" {
                            if has_db {
                                return Err(syn::Error::new(
                                    input.span(),
                                    "Test cannot accept more than one `mongodb::Database`",
                                ));
                            }
                            has_db = true;
                            // Always present when a database was requested.
                            args.push(quote! { db.clone().unwrap() });
                            continue;
                        }
                    }
                }
            }
        }

        return Err(syn::Error::new(
            input.span(),
            "Expected one of `client_ident: Client`, `election_ident: Election` or `db_ident: Database`",
        ));
    }

    Ok((args, has_db))
}
